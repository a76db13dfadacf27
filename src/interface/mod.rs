pub mod queries;

pub use queries::{
    handle_get_mode, handle_set_hint, GetModeRequest, GetModeResponse, InterfaceError,
    SetHintAck, SetHintRequest,
};
