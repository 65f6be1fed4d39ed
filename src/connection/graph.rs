//! Graph service RPC stub

use super::transport::Transport;
use crate::protocol::decode::{
    decode_auth_response, decode_binary_result, decode_execution_response,
    decode_verify_client_version_resp,
};
use crate::protocol::{
    decode_reply, encode_call, AuthResponse, ExecutionResponse, GraphRequest, ParameterMap,
    Reader, Reply, VerifyClientVersionReq, VerifyClientVersionResp,
};
use crate::{Error, Result};
use bytes::Bytes;
use std::io;
use std::time::Instant;

/// Typed graph service calls over one transport
///
/// Every call gets a fresh sequence id and its reply must carry the same one.
/// A reply left over from an earlier timed-out call is reported as
/// [`Error::SequenceMismatch`] instead of being taken as this call's answer.
#[derive(Debug)]
pub struct GraphClient {
    transport: Box<dyn Transport>,
    seq_id: i32,
}

impl GraphClient {
    /// Wrap an unopened transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            seq_id: 0,
        }
    }

    /// Open the underlying transport
    pub async fn open(&mut self) -> Result<()> {
        self.transport.open().await
    }

    /// Whether the underlying transport is open
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// `verifyClientVersion`
    pub async fn verify_client_version(
        &mut self,
        req: VerifyClientVersionReq,
    ) -> Result<VerifyClientVersionResp> {
        self.round_trip(
            &GraphRequest::VerifyClientVersion(req),
            decode_verify_client_version_resp,
        )
        .await
    }

    /// `authenticate`
    pub async fn authenticate(&mut self, username: &[u8], password: &[u8]) -> Result<AuthResponse> {
        self.round_trip(
            &GraphRequest::Authenticate { username, password },
            decode_auth_response,
        )
        .await
    }

    /// `signout` (oneway)
    pub async fn signout(&mut self, session_id: i64) -> Result<()> {
        let seq_id = self.next_seq_id();
        let request = GraphRequest::Signout { session_id };
        let payload = encode_call(&request, seq_id)?.freeze();
        let result = self.transport.send_oneway(seq_id, payload).await;
        if let Err(e) = &result {
            crate::metrics::counters::request_error(request.method(), e.category());
        }
        result
    }

    /// `executeWithParameter`
    pub async fn execute_with_parameter(
        &mut self,
        session_id: i64,
        stmt: &[u8],
        params: &ParameterMap,
    ) -> Result<ExecutionResponse> {
        self.round_trip(
            &GraphRequest::ExecuteWithParameter {
                session_id,
                stmt,
                params,
            },
            decode_execution_response,
        )
        .await
    }

    /// `executeWithTimeout`
    pub async fn execute_with_timeout(
        &mut self,
        session_id: i64,
        stmt: &[u8],
        params: &ParameterMap,
        timeout_ms: i64,
    ) -> Result<ExecutionResponse> {
        self.round_trip(
            &GraphRequest::ExecuteWithTimeout {
                session_id,
                stmt,
                params,
                timeout_ms,
            },
            decode_execution_response,
        )
        .await
    }

    /// `executeJsonWithParameter`
    pub async fn execute_json_with_parameter(
        &mut self,
        session_id: i64,
        stmt: &[u8],
        params: &ParameterMap,
    ) -> Result<Bytes> {
        self.round_trip(
            &GraphRequest::ExecuteJsonWithParameter {
                session_id,
                stmt,
                params,
            },
            decode_binary_result,
        )
        .await
    }

    fn next_seq_id(&mut self) -> i32 {
        self.seq_id = self.seq_id.wrapping_add(1);
        self.seq_id
    }

    async fn round_trip<T>(
        &mut self,
        request: &GraphRequest<'_>,
        decode_result: fn(&mut Reader, u8) -> io::Result<T>,
    ) -> Result<T> {
        let method = request.method();
        let seq_id = self.next_seq_id();
        let started = Instant::now();

        let payload = encode_call(request, seq_id)?.freeze();
        let result = match self.transport.call(seq_id, payload).await {
            Ok(reply) => match decode_reply(reply, method, seq_id, decode_result) {
                Ok(Reply::Success(value)) => Ok(value),
                Ok(Reply::Exception { kind, message }) => Err(Error::Application { kind, message }),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        crate::metrics::histograms::request_duration(method, started.elapsed().as_millis() as u64);
        if let Err(e) = &result {
            tracing::debug!(method, seq_id, error = %e, "request failed");
            crate::metrics::counters::request_error(method, e.category());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        encode_exception, encode_reply, ApplicationErrorKind, ErrorCode, ServerReply,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy)]
    enum Canned {
        VerifyOk,
        Json,
        Stale,
        Exception,
    }

    impl Canned {
        fn reply(self, name: &str, seq_id: i32) -> Bytes {
            let buf = match self {
                Canned::VerifyOk => {
                    let resp = VerifyClientVersionResp::default();
                    encode_reply(name, seq_id, &ServerReply::VerifyClientVersion(&resp))
                }
                Canned::Json => encode_reply(name, seq_id, &ServerReply::Json(b"{\"results\":[]}")),
                Canned::Stale => encode_reply(name, seq_id - 1, &ServerReply::Json(b"{}")),
                Canned::Exception => {
                    encode_exception(name, seq_id, ApplicationErrorKind::InternalError, "boom")
                }
            };
            buf.unwrap().freeze()
        }
    }

    /// Answers each call with a canned reply built from the request's own header
    #[derive(Debug, Default)]
    struct EchoTransport {
        open: bool,
        replies: VecDeque<Canned>,
        oneway: Vec<i32>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn open(&mut self) -> Result<()> {
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn close(&mut self) -> Result<()> {
            self.open = false;
            Ok(())
        }

        async fn call(&mut self, _seq_id: i32, request: Bytes) -> Result<Bytes> {
            let (name, _, seq_id) = Reader::new(request).read_message_begin()?;
            let canned = self
                .replies
                .pop_front()
                .ok_or_else(|| Error::Transport("no reply scripted".into()))?;
            Ok(canned.reply(&name, seq_id))
        }

        async fn send_oneway(&mut self, seq_id: i32, _request: Bytes) -> Result<()> {
            self.oneway.push(seq_id);
            Ok(())
        }
    }

    fn client(replies: &[Canned]) -> GraphClient {
        GraphClient::new(Box::new(EchoTransport {
            replies: replies.iter().copied().collect(),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_verify_client_version() {
        let mut client = client(&[Canned::VerifyOk]);
        client.open().await.unwrap();
        let resp = client
            .verify_client_version(VerifyClientVersionReq::default())
            .await
            .unwrap();
        assert_eq!(resp.error_code, ErrorCode::SUCCEEDED);
    }

    #[tokio::test]
    async fn test_sequence_ids_increase() {
        let mut client = client(&[Canned::Json, Canned::Json]);
        let params = ParameterMap::new();
        client.execute_json_with_parameter(1, b"YIELD 1", &params).await.unwrap();
        let payload = client
            .execute_json_with_parameter(1, b"YIELD 1", &params)
            .await
            .unwrap();
        assert_eq!(&payload[..], b"{\"results\":[]}");
        assert_eq!(client.seq_id, 2);
    }

    #[tokio::test]
    async fn test_stale_reply_is_sequence_mismatch() {
        let mut client = client(&[Canned::Stale]);
        let err = client
            .execute_json_with_parameter(1, b"YIELD 1", &ParameterMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SequenceMismatch {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_exception_reply() {
        let mut client = client(&[Canned::Exception]);
        let err = client
            .execute_with_parameter(1, b"YIELD 1", &ParameterMap::new())
            .await
            .unwrap_err();
        match err {
            Error::Application { kind, message } => {
                assert_eq!(kind, ApplicationErrorKind::InternalError);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signout_is_oneway() {
        let mut client = client(&[]);
        client.signout(42).await.unwrap();
        assert_eq!(client.seq_id, 1);
        assert_eq!(format!("{:?}", client.transport).matches("oneway: [1]").count(), 1);
    }
}
