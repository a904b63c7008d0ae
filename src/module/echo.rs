//! Demo module registered by the host binary under `echo`.
//!
//! Over HTTP it answers with the parameter view as a JSON object; over
//! WebSocket it sends every text frame straight back.

use crate::error::ModuleError;
use crate::http::{GatewayRequest, HttpParams, ResponseBuilder, ResponseDraft};
use crate::module::{HttpModule, WebSocketModule};
use crate::websocket::{Handshake, WebSocketConnection, WebSocketHandler};

#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModule;

impl HttpModule for EchoModule {
    fn handle_request(
        &self,
        _path: &str,
        params: &HttpParams,
        _request: &GatewayRequest,
    ) -> Result<Option<ResponseDraft>, ModuleError> {
        Ok(Some(ResponseBuilder::ok().json(params).build()?))
    }
}

impl WebSocketModule for EchoModule {
    fn new_connection(
        &self,
        _handshake: &Handshake,
        path: &str,
        _params: HttpParams,
        _request: &GatewayRequest,
    ) -> Result<Box<dyn WebSocketHandler>, ModuleError> {
        Ok(Box::new(EchoHandler {
            path: path.to_string(),
        }))
    }
}

struct EchoHandler {
    path: String,
}

impl WebSocketHandler for EchoHandler {
    fn register(&mut self, conn: &WebSocketConnection) -> Result<(), ModuleError> {
        tracing::debug!(connection_id = %conn.id(), path = %self.path, "Echo connection registered");
        Ok(())
    }

    fn handle_text_message(&mut self, conn: &WebSocketConnection, message: String) -> Result<(), ModuleError> {
        let _ = conn.send_text(message);
        Ok(())
    }
}
