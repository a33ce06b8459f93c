//! Conversions from `reqwest` failures into the transport-fault model.

use std::error::Error as StdError;

use relaygate_common::{ConnectionCode, TransportFault};
use reqwest::Error as HttpError;

/// Extension trait keeping the `reqwest` mapping on the infrastructure side.
///
/// `TransportFault` lives in `relaygate-common`, so a plain `From` impl is not
/// available here.
pub trait IntoTransportFault {
    fn into_transport_fault(self) -> TransportFault;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportFault */
/* -------------------------------------------------------------------------- */

impl IntoTransportFault for HttpError {
    fn into_transport_fault(self) -> TransportFault {
        let chain = error_chain_text(&self);

        if self.is_timeout() {
            return TransportFault::Timeout { elapsed: None, message: chain };
        }

        if let Some(status) = self.status() {
            return TransportFault::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().map(str::to_string),
                headers: Default::default(),
                body: None,
                message: Some(chain),
            };
        }

        if self.is_connect() {
            let code = ConnectionCode::infer(&chain).unwrap_or(ConnectionCode::ECONNREFUSED);
            return TransportFault::connection(code, chain);
        }

        match ConnectionCode::infer(&chain) {
            Some(code) => TransportFault::connection(code, chain),
            None => TransportFault::other(chain),
        }
    }
}

/// Join an error and its sources into one line
///
/// `reqwest` hides the OS-level reason ("Connection refused", "dns error")
/// in the source chain, which is what connection-code inference needs.
pub(crate) fn error_chain_text(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
