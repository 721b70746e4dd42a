//! Store host: serves size/read/write/call requests against page memory
//!
//! Used both by the QUIC server and by the in-process client. Every request
//! carries the caller's principal and is checked against the access list
//! before touching memory or records.

use crate::auth::{AccessList, AuthorizedEntry, Principal};
use crate::store::error::{StoreError, StoreResult};
use crate::store::memory::PageMemory;
use crate::store::types::{decode, encode, methods, pages_for, Profile, Record};
use crate::store::types::{StoreRequest, StoreResponse};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct StoreService {
    memory: Mutex<Box<dyn PageMemory>>,
    records: RwLock<BTreeMap<String, Profile>>,
    records_path: Option<PathBuf>,
    acl: AccessList,
}

impl StoreService {
    pub fn new(memory: impl PageMemory + 'static) -> Self {
        Self {
            memory: Mutex::new(Box::new(memory)),
            records: RwLock::new(BTreeMap::new()),
            records_path: None,
            acl: AccessList::new(),
        }
    }

    /// Grant full access to `principal`
    pub fn with_controller(self, principal: Principal) -> Self {
        self.acl.grant_controller(principal);
        self
    }

    /// Persist records to `path` (JSON) on every restore, loading any existing file
    pub fn with_records_file(mut self, path: &Path) -> StoreResult<Self> {
        if path.exists() {
            let contents = std::fs::read(path)?;
            let records: Vec<Record> = serde_json::from_slice(&contents)
                .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?;
            tracing::info!("Loaded {} records from {}", records.len(), path.display());
            self.records.write().extend(records);
        }
        self.records_path = Some(path.to_path_buf());
        Ok(self)
    }

    pub fn access_list(&self) -> &AccessList {
        &self.acl
    }

    /// Handle one request on behalf of `caller`. Failures become `StoreResponse::Error`.
    pub fn handle(&self, caller: &Principal, request: StoreRequest) -> StoreResponse {
        let name = request.name().to_string();
        match self.dispatch(caller, request) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Request {} from {} failed: {}", name, caller, e);
                StoreResponse::from_error(&e)
            }
        }
    }

    fn dispatch(&self, caller: &Principal, request: StoreRequest) -> StoreResult<StoreResponse> {
        match request {
            StoreRequest::Size => {
                self.require_stable(caller)?;
                Ok(StoreResponse::Size(self.size()))
            }
            StoreRequest::Read { offset, length } => {
                self.require_stable(caller)?;
                Ok(StoreResponse::Data(self.read(offset, length)?))
            }
            StoreRequest::Write { offset, data } => {
                self.require_stable(caller)?;
                self.write(offset, &data)?;
                Ok(StoreResponse::Ack)
            }
            StoreRequest::Call { method, args } => {
                Ok(StoreResponse::Reply(self.call(caller, &method, &args)?))
            }
        }
    }

    pub fn size(&self) -> u64 {
        self.memory.lock().size()
    }

    pub fn read(&self, offset: u64, length: u64) -> StoreResult<Bytes> {
        let mut memory = self.memory.lock();
        memory.check_range(offset, length)?;

        let mut buffer = vec![0u8; length as usize];
        memory.read(offset, &mut buffer)?;
        Ok(Bytes::from(buffer))
    }

    /// Write `data` at `offset`, growing by whole pages when the range ends past the current size
    pub fn write(&self, offset: u64, data: &[u8]) -> StoreResult<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(StoreError::OutOfBounds {
                offset,
                length: data.len() as u64,
                size: u64::MAX,
            })?;

        let mut memory = self.memory.lock();
        let needed = pages_for(end);
        let current = memory.page_count();
        if needed > current {
            memory.grow(needed - current)?;
            tracing::debug!("Grew store from {} to {} pages", current, needed);
        }

        memory.write(offset, data)
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.memory.lock().flush()
    }

    fn call(&self, caller: &Principal, method: &str, args: &[u8]) -> StoreResult<Vec<u8>> {
        match method {
            methods::BACKUP => {
                self.require_records(caller)?;
                let (offset, count): (u32, u32) = decode_args(method, args)?;
                encode(&self.backup(offset, count))
            }
            methods::RESTORE => {
                self.require_records(caller)?;
                let records: Vec<Record> = decode_args(method, args)?;
                self.restore(records)?;
                encode(&())
            }
            methods::AUTHORIZE => {
                self.require_records(caller)?;
                let principal = decode_principal(method, args)?;
                self.acl.grant_records(principal);
                tracing::info!("{} authorized {}", caller, principal);
                encode(&())
            }
            methods::STABLE_AUTHORIZE => {
                self.require_stable(caller)?;
                let principal = decode_principal(method, args)?;
                self.acl.grant_stable(principal);
                tracing::info!("{} stable-authorized {}", caller, principal);
                encode(&())
            }
            methods::DEAUTHORIZE => {
                self.require_records(caller)?;
                let principal = decode_principal(method, args)?;
                let removed = self.acl.revoke(&principal);
                tracing::info!("{} deauthorized {} (listed: {})", caller, principal, removed);
                encode(&removed)
            }
            methods::GET_AUTHORIZED => {
                let entries: Vec<AuthorizedEntry> = self.acl.list();
                encode(&entries)
            }
            methods::WHOAMI => encode(&caller.to_text()),
            other => Err(StoreError::UnknownMethod(other.to_string())),
        }
    }

    fn backup(&self, offset: u32, count: u32) -> Vec<Record> {
        self.records
            .read()
            .iter()
            .skip(offset as usize)
            .take(count as usize)
            .map(|(key, profile)| (key.clone(), profile.clone()))
            .collect()
    }

    fn restore(&self, records: Vec<Record>) -> StoreResult<()> {
        let mut stored = self.records.write();
        let count = records.len();

        // Nothing is committed in memory unless the records file was replaced
        let mut merged = stored.clone();
        merged.extend(records);
        if let Some(path) = &self.records_path {
            persist_records(path, &merged)?;
        }

        *stored = merged;
        tracing::info!("Restored {} records ({} total)", count, stored.len());
        Ok(())
    }

    fn require_records(&self, caller: &Principal) -> StoreResult<()> {
        if self.acl.is_authorized(caller) {
            Ok(())
        } else {
            Err(StoreError::NotAuthorized(format!("{caller} is not authorized")))
        }
    }

    fn require_stable(&self, caller: &Principal) -> StoreResult<()> {
        if self.acl.is_stable_authorized(caller) {
            Ok(())
        } else {
            Err(StoreError::NotAuthorized(format!(
                "{caller} is not stable authorized"
            )))
        }
    }
}

fn decode_args<T: serde::de::DeserializeOwned>(method: &str, args: &[u8]) -> StoreResult<T> {
    decode(args).map_err(|e| StoreError::InvalidArguments {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

fn decode_principal(method: &str, args: &[u8]) -> StoreResult<Principal> {
    let text: String = decode_args(method, args)?;
    Principal::from_text(&text).map_err(|e| StoreError::InvalidArguments {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

fn persist_records(path: &Path, records: &BTreeMap<String, Profile>) -> StoreResult<()> {
    let all: Vec<(&String, &Profile)> = records.iter().collect();
    let json =
        serde_json::to_vec_pretty(&all).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let temp = crate::snapshot::rotate::temp_sibling(path);
    let written = std::fs::write(&temp, json).and_then(|()| std::fs::rename(&temp, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}
