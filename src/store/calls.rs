//! Typed wrappers over the generic `call` primitive

use crate::auth::{AuthorizedEntry, Principal};
use crate::store::client::RemoteStore;
use crate::store::error::StoreResult;
use crate::store::types::{decode, encode, methods, Record};
use serde::{de::DeserializeOwned, Serialize};

pub async fn call_typed<S, A, R>(store: &S, method: &str, args: &A) -> StoreResult<R>
where
    S: RemoteStore + ?Sized,
    A: Serialize + Sync + ?Sized,
    R: DeserializeOwned,
{
    let reply = store.call(method, encode(args)?).await?;
    decode(&reply)
}

pub async fn backup_page<S: RemoteStore + ?Sized>(
    store: &S,
    offset: u32,
    count: u32,
) -> StoreResult<Vec<Record>> {
    call_typed(store, methods::BACKUP, &(offset, count)).await
}

pub async fn restore<S: RemoteStore + ?Sized>(store: &S, records: &[Record]) -> StoreResult<()> {
    call_typed(store, methods::RESTORE, records).await
}

pub async fn authorize<S: RemoteStore + ?Sized>(store: &S, principal: Principal) -> StoreResult<()> {
    call_typed(store, methods::AUTHORIZE, &principal.to_text()).await
}

pub async fn stable_authorize<S: RemoteStore + ?Sized>(
    store: &S,
    principal: Principal,
) -> StoreResult<()> {
    call_typed(store, methods::STABLE_AUTHORIZE, &principal.to_text()).await
}

/// Returns whether the principal had been listed
pub async fn deauthorize<S: RemoteStore + ?Sized>(
    store: &S,
    principal: Principal,
) -> StoreResult<bool> {
    call_typed(store, methods::DEAUTHORIZE, &principal.to_text()).await
}

pub async fn get_authorized<S: RemoteStore + ?Sized>(
    store: &S,
) -> StoreResult<Vec<AuthorizedEntry>> {
    call_typed(store, methods::GET_AUTHORIZED, &()).await
}

pub async fn whoami<S: RemoteStore + ?Sized>(store: &S) -> StoreResult<String> {
    call_typed(store, methods::WHOAMI, &()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::local::LocalClient;
    use crate::store::memory::InMemoryPages;
    use crate::store::service::StoreService;
    use crate::store::StoreError;
    use std::sync::Arc;

    fn setup() -> (Arc<StoreService>, Principal) {
        let owner = Principal::from_token(&[1u8; 32]);
        let service = Arc::new(StoreService::new(InMemoryPages::new()).with_controller(owner));
        (service, owner)
    }

    #[tokio::test]
    async fn test_authorize_flow() {
        let (service, owner) = setup();
        let admin = LocalClient::new(service.clone(), owner);
        let newcomer = Principal::from_token(&[2u8; 32]);
        let other = LocalClient::new(service, newcomer);

        assert!(matches!(
            backup_page(&other, 0, 10).await,
            Err(StoreError::NotAuthorized(_))
        ));

        authorize(&admin, newcomer).await.unwrap();
        assert!(backup_page(&other, 0, 10).await.unwrap().is_empty());

        let listed = get_authorized(&other).await.unwrap();
        assert_eq!(listed.len(), 2);

        assert!(deauthorize(&admin, newcomer).await.unwrap());
        assert!(backup_page(&other, 0, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_whoami() {
        let (service, owner) = setup();
        let client = LocalClient::new(service, owner);
        assert_eq!(whoami(&client).await.unwrap(), owner.to_text());
    }
}
