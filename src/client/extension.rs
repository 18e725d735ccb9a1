use std::borrow::Cow;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use hashbrown::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::proto::xproto::QueryExtensionReply;

/// Opcodes assigned to an extension by server.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub major_opcode: u8,
    pub first_event: u8,
    pub first_error: u8,
}

/// Per-connection cache of extension lookups, absence included.
///
/// Resolved entries are read without waiting. Lookups that miss are serialized, so each name is
/// queried at most once.
#[derive(Default)]
pub(crate) struct ExtensionRegistry {
    resolved: RwLock<HashMap<String, Option<ExtensionInfo>>>,
    lookup: Mutex<()>,
}

fn present(name: &str, info: Option<ExtensionInfo>) -> Result<ExtensionInfo, Error> {
    info.ok_or_else(|| Error::ExtensionNotPresent(Cow::Owned(name.to_string())))
}

impl ExtensionRegistry {
    fn cached(&self, name: &str) -> Option<Option<ExtensionInfo>> {
        self.resolved.read().unwrap_or_else(PoisonError::into_inner).get(name).copied()
    }

    /// Returns cached lookup result, or runs `query` once for `name` with other missed lookups
    /// waiting.
    pub async fn resolve<F, Fut>(&self, name: &str, query: F) -> Result<ExtensionInfo, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<QueryExtensionReply, Error>>, {
        if let Some(info) = self.cached(name) {
            return present(name, info);
        }
        let _lookup = self.lookup.lock().await;
        if let Some(info) = self.cached(name) {
            return present(name, info);
        }
        let reply = query().await?;
        let info = reply.present.then_some(ExtensionInfo {
            major_opcode: reply.major_opcode,
            first_event: reply.first_event,
            first_error: reply.first_error,
        });
        debug!(extension = name, ?info, "resolved extension");
        self.resolved.write().unwrap_or_else(PoisonError::into_inner).insert(name.to_string(), info);
        present(name, info)
    }
}
