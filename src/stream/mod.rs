pub mod frame;
pub mod session;
pub mod sse;
pub mod translate;

pub use frame::{Frame, FrameParser};
pub use session::{relay_stream, CloseReason, RelaySession, SessionState};
pub use sse::{done_frame, fragment_frame, sse_ok_response, DONE_FRAME};
pub use translate::{translate_frame, IgnoreReason, Translation};
