//! Safety layer: keeps secrets and image payloads out of logs and
//! user-visible error text.

pub mod redact;
