use thiserror::Error;

/// Fatal configuration errors; raised at construction or reconfiguration
/// time, never during a frame.
///
/// Sampling failures (occluded shifts, empty reservoirs, off-screen
/// reprojections) are not errors, they just contribute zero weight.
#[derive(Debug, Error)]
pub enum Error {
    #[error("device `{name}` does not support inline ray tracing")]
    UnsupportedDevice { name: String },

    #[error(
        "invalid option `{option}`: {value} is outside of {min} ..= {max}"
    )]
    OptionOutOfRange {
        option: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
