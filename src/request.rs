//! Authenticated request executor.
//!
//! Every WeCom API call besides gettoken carries `access_token` as a query parameter and
//! answers with an `{errcode, errmsg, ...}` envelope. `WxcomClient::execute` attaches the
//! cached token, decodes the envelope next to the caller's response shape and, when the
//! envelope reports 42001/40014, drops the rejected token and reissues the identical request
//! once with a freshly fetched token. The second reply is returned whatever its errcode.
//!
//! Other nonzero codes are domain failures: no retry, no eviction.
//! Non-2xx statuses and bodies without `errcode` are transport failures, handled the same way.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::errors;
use crate::token::{Error, Result, WxcomClient, ensure_success, redacted_body};

/// Retries allowed after a token-invalid reply
pub const MAX_TOKEN_RETRIES: u32 = 1;

/// Common `{errcode, errmsg}` wrapper present on every response.
///
/// `errcode` is required: a body without it is not a WeCom reply.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl Envelope {
    pub fn is_ok(&self) -> bool {
        self.errcode == 0
    }

    pub fn is_token_invalid(&self) -> bool {
        errors::is_token_invalid(self.errcode)
    }

    /// `Err(Error::Domain)` for any nonzero errcode
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::Domain {
                code: self.errcode,
                message: self.errmsg,
            })
        }
    }
}

/// A decoded reply: the envelope plus the caller-supplied body shape
#[derive(Clone, Debug)]
pub struct ApiReply<T> {
    pub envelope: Envelope,
    pub body: T,
}

impl<T> ApiReply<T> {
    /// Body on errcode 0, `Error::Domain` otherwise
    pub fn into_result(self) -> Result<T> {
        self.envelope.into_result()?;
        Ok(self.body)
    }
}

impl WxcomClient {
    /// Issue one authenticated call with evict-and-retry-once on token-invalid replies.
    ///
    /// - `path`: API path such as `/cgi-bin/message/send`
    /// - `query`: extra query parameters; `access_token` is appended automatically
    /// - `body`: JSON body (POST) or `None`
    ///
    /// Errors: token fetch failures (`Authentication`, transport) and transport/decode
    /// failures of the call itself. A nonzero errcode is *not* an error at this level.
    #[instrument(level = "debug", skip(self, query, body), fields(agent_id = self.agent_id()))]
    pub async fn execute<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<ApiReply<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            let access_token = self.get_access_token().await?;
            let reply = self
                .dispatch::<B, T>(method.clone(), path, query, body, &access_token)
                .await?;

            if reply.envelope.is_token_invalid() && attempt < MAX_TOKEN_RETRIES {
                warn!(
                    errcode = reply.envelope.errcode,
                    errmsg = %reply.envelope.errmsg,
                    "access_token rejected; invalidating cache and retrying"
                );
                self.cache.invalidate_if(self.agent_id(), &access_token);
                attempt += 1;
                continue;
            }
            if !reply.envelope.is_ok() {
                debug!(
                    errcode = reply.envelope.errcode,
                    errmsg = %reply.envelope.errmsg,
                    "api returned non-zero errcode"
                );
            }
            return Ok(reply);
        }
    }

    /// GET with query parameters
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiReply<T>> {
        self.execute::<(), T>(Method::GET, path, query, None).await
    }

    /// POST a JSON body
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<ApiReply<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, &[], Some(body)).await
    }

    async fn dispatch<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        access_token: &str,
    ) -> Result<ApiReply<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut url = self.endpoint(path)?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("access_token", access_token);
            for (k, v) in query {
                qp.append_pair(k, v);
            }
        }
        debug!(%method, path, "api request");

        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        ensure_success(status, &bytes)?;

        let decoded = serde_json::from_slice::<Envelope>(&bytes)
            .and_then(|envelope| Ok((envelope, serde_json::from_slice::<T>(&bytes)?)));
        match decoded {
            Ok((envelope, body)) => Ok(ApiReply { envelope, body }),
            Err(de_err) => Err(Error::UnexpectedResponse {
                status: status.as_u16(),
                error: de_err.to_string(),
                body: redacted_body(&bytes),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_requires_errcode() {
        assert!(serde_json::from_str::<Envelope>("{}").is_err());
        assert!(serde_json::from_str::<Envelope>(r#"{"errmsg":"ok"}"#).is_err());

        let env: Envelope = serde_json::from_str(r#"{"errcode":0}"#).unwrap();
        assert!(env.is_ok());
        assert!(env.errmsg.is_empty());
    }

    #[test]
    fn envelope_into_result_keeps_remote_message() {
        let env: Envelope =
            serde_json::from_str(r#"{"errcode":301000,"errmsg":"recipient list empty"}"#).unwrap();
        assert!(!env.is_token_invalid());
        match env.into_result() {
            Err(Error::Domain { code, message }) => {
                assert_eq!(code, 301000);
                assert_eq!(message, "recipient list empty");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn token_invalid_envelopes() {
        for code in [42001, 40014] {
            let env = Envelope {
                errcode: code,
                errmsg: String::new(),
            };
            assert!(env.is_token_invalid());
        }
    }
}
