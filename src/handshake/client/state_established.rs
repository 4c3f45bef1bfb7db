use super::HandshakeClient;
use crate::error::{HandshakeError, Result};
use crate::handshake::Progress;
use crate::handshake::common::{unexpected, unexpected_handshake};
use crate::protocol::message::{HandshakeMessage, Message};
use crate::protocol::state::ClientState;
use tracing::debug;

impl HandshakeClient {
    pub(super) fn on_record_while_connected(
        &mut self,
        message: Message,
        progress: &mut Progress,
    ) -> Result<()> {
        match message {
            Message::ApplicationData(data) => {
                progress.application_data.push(data);
                Ok(())
            }
            other => Err(unexpected(&other, self.state.name())),
        }
    }

    /// KeyUpdate is honoured; NewSessionTicket is skipped since resumption is
    /// not offered.
    pub(super) fn on_post_handshake_message(&mut self, message: HandshakeMessage) -> Result<()> {
        match message {
            HandshakeMessage::KeyUpdate(request) => {
                self.core.key_update_received(request, self.state.name())
            }
            HandshakeMessage::NewSessionTicket { .. } => {
                debug!("ignoring NewSessionTicket");
                Ok(())
            }
            other => Err(unexpected_handshake(&other, self.state.name())),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        self.ensure_usable()?;
        if self.state != ClientState::Connected {
            return Err(HandshakeError::InvalidState);
        }
        Ok(())
    }

    /// Encrypts application data into one or more records.
    ///
    /// 将应用数据加密为一条或多条记录。
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        match self.core.send_application_data(data) {
            Ok(()) => Ok(self.core.take_output()),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Sends a KeyUpdate and ratchets our write direction.
    ///
    /// With `request_peer` the server is asked to ratchet its own direction too.
    ///
    /// 发送 KeyUpdate 并更新本端写方向的密钥。`request_peer` 为真时同时请求服务器更新其方向。
    pub fn send_key_update(&mut self, request_peer: bool) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        match self.core.send_key_update(request_peer) {
            Ok(()) => Ok(self.core.take_output()),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Sends close_notify and moves to `Closed`.
    ///
    /// 发送 close_notify 并进入 `Closed` 状态。
    pub fn close(&mut self) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        if self.state == ClientState::Start {
            return Err(HandshakeError::InvalidState);
        }
        let out = self.core.close();
        self.shut_down();
        out
    }
}
