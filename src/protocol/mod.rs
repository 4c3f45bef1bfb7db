//! Wire structures shared by both roles and the bookkeeping that binds them.
//!
//! 两种角色共享的线上结构，以及将它们绑定在一起的握手记录。

pub mod alert;
pub mod codec;
pub mod extension;
pub mod message;
pub mod state;
pub mod transcript;
