use std::fmt;

use crate::domain::utils::id::VdagUri;
use crate::domain::vdag::node::SUB_VDAG_PREFIX;
use crate::error::{Error, Result};

const SEPARATOR: &str = ":::";

/// Who governs a packet: nobody (adhoc) or a vDAG session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionContext {
    Plain(String),
    VdagGoverned { uri: VdagUri, session: String },
}

impl SessionContext {
    /// Parses `vdag:::<uri>:::<suffix>`; any other id is a plain session.
    /// The suffix may not contain another `:::`.
    pub fn parse(session_id: &str) -> Result<Self> {
        let Some(rest) = session_id.strip_prefix(SUB_VDAG_PREFIX) else {
            return Ok(SessionContext::Plain(session_id.to_string()));
        };

        match rest.split_once(SEPARATOR) {
            Some((uri, session)) if !uri.is_empty() && !session.is_empty() && !session.contains(SEPARATOR) => {
                Ok(SessionContext::VdagGoverned { uri: VdagUri::new(uri), session: session.to_string() })
            }
            _ => Err(Error::Validation(format!("malformed vDAG session id '{}'", session_id))),
        }
    }

    pub fn governed(uri: &VdagUri, session: &str) -> Self {
        SessionContext::VdagGoverned { uri: uri.clone(), session: session.to_string() }
    }

    pub fn vdag_uri(&self) -> Option<&VdagUri> {
        match self {
            SessionContext::Plain(_) => None,
            SessionContext::VdagGoverned { uri, .. } => Some(uri),
        }
    }
}

impl fmt::Display for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionContext::Plain(id) => f.write_str(id),
            SessionContext::VdagGoverned { uri, session } => {
                write!(f, "{}{}{}{}", SUB_VDAG_PREFIX, uri, SEPARATOR, session)
            }
        }
    }
}
