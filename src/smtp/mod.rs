//! SMTP client plumbing
//!
//! Only what the harness needs: line framing of replies and replaying a
//! script over one connection. No SMTP grammar is interpreted.

pub mod codec;
pub mod session;

pub use codec::FramedReader;
pub use session::{reply_code, AddressFamily, Session};
