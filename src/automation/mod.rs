mod emergency;
#[cfg(feature = "native")]
mod enigo_input;
mod executor;
mod input;

pub use emergency::EmergencyStop;
#[cfg(feature = "native")]
pub use enigo_input::EnigoInput;
pub use executor::{ExecutionOutcome, Executor, ExecutorConfig, Refusal};
pub use input::{InputAction, InputDevice, RecordingInput};
