// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base::error;
use enumn::N;
use serde_json::Value;
use service_manager::read_parcel;
use service_manager::transact_typed;
use service_manager::write_parcel;
use service_manager::Error;
use service_manager::Result;
use service_manager::Service;
use service_manager::SpBinder;

use crate::IntelligenceService;
use crate::ResultData;
use crate::ResultReceiver;
use crate::UserId;

/// How long the stub waits for the implementation to complete a session command.
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum TransactionCode {
    ListSessions = 1,
    DestroySessions = 2,
    GetAllowInstantService = 3,
    SetAllowInstantService = 4,
}

/// `IntelligenceService` reached through a remote object.
///
/// Session commands run on their own thread; if the transaction fails the receiver is dropped
/// without being called.
pub struct IntelligenceServiceProxy {
    binder: SpBinder,
}

impl IntelligenceServiceProxy {
    pub fn new(binder: SpBinder) -> Self {
        IntelligenceServiceProxy { binder }
    }

    // The call thread is detached. It ends when the transaction returns, which may be after the
    // caller gave up waiting on the receiver.
    fn session_command(&self, code: TransactionCode, user_id: UserId, receiver: ResultReceiver) {
        let binder = Arc::clone(&self.binder);
        let spawned = thread::Builder::new()
            .name("intelligence_call".to_owned())
            .spawn(move || {
                match transact_typed::<_, ResultData>(binder.as_ref(), code as u32, &user_id) {
                    Ok(data) => receiver.send(0, data),
                    Err(e) => error!("{:?} failed: {}", code, e),
                }
            });
        if let Err(e) = spawned {
            error!("failed to spawn call thread: {}", e);
        }
    }
}

impl IntelligenceService for IntelligenceServiceProxy {
    fn list_sessions(&self, user_id: UserId, receiver: ResultReceiver) {
        self.session_command(TransactionCode::ListSessions, user_id, receiver)
    }

    fn destroy_sessions(&self, user_id: UserId, receiver: ResultReceiver) {
        self.session_command(TransactionCode::DestroySessions, user_id, receiver)
    }

    fn get_allow_instant_service(&self) -> bool {
        transact_typed(
            self.binder.as_ref(),
            TransactionCode::GetAllowInstantService as u32,
            &(),
        )
        .unwrap_or_else(|e| {
            error!("GetAllowInstantService failed: {}", e);
            false
        })
    }

    fn set_allow_instant_service(&self, allowed: bool) {
        if let Err(e) = transact_typed::<_, ()>(
            self.binder.as_ref(),
            TransactionCode::SetAllowInstantService as u32,
            &allowed,
        ) {
            error!("SetAllowInstantService failed: {}", e);
        }
    }
}

/// Serves a local `IntelligenceService` to remote callers.
pub struct IntelligenceServiceStub<T: IntelligenceService> {
    service: T,
}

impl<T: IntelligenceService> IntelligenceServiceStub<T> {
    pub fn new(service: T) -> Self {
        IntelligenceServiceStub { service }
    }

    /// Runs a session command and blocks until the implementation answers.
    fn session_command(
        &self,
        data: Value,
        f: impl FnOnce(&T, UserId, ResultReceiver),
    ) -> Result<Value> {
        let user_id: UserId = read_parcel(data)?;
        let (tx, rx) = channel();
        f(
            &self.service,
            user_id,
            ResultReceiver::new(move |_code, data| {
                // The caller may have given up already.
                let _ = tx.send(data);
            }),
        );
        let data = rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|e| Error::FailedTransaction(format!("no result from service: {}", e)))?;
        write_parcel(&data)
    }
}

impl<T: IntelligenceService> Service for IntelligenceServiceStub<T> {
    fn on_transact(&self, code: u32, data: Value) -> Result<Value> {
        let code = TransactionCode::n(code).ok_or(Error::UnknownTransaction(code))?;
        match code {
            TransactionCode::ListSessions => {
                self.session_command(data, |s, user, receiver| s.list_sessions(user, receiver))
            }
            TransactionCode::DestroySessions => {
                self.session_command(data, |s, user, receiver| s.destroy_sessions(user, receiver))
            }
            TransactionCode::GetAllowInstantService => {
                write_parcel(&self.service.get_allow_instant_service())
            }
            TransactionCode::SetAllowInstantService => {
                self.service
                    .set_allow_instant_service(read_parcel(data)?);
                write_parcel(&())
            }
        }
    }
}

impl<T: IntelligenceService + ?Sized> IntelligenceService for Arc<T> {
    fn list_sessions(&self, user_id: UserId, receiver: ResultReceiver) {
        (**self).list_sessions(user_id, receiver)
    }

    fn destroy_sessions(&self, user_id: UserId, receiver: ResultReceiver) {
        (**self).destroy_sessions(user_id, receiver)
    }

    fn get_allow_instant_service(&self) -> bool {
        (**self).get_allow_instant_service()
    }

    fn set_allow_instant_service(&self, allowed: bool) {
        (**self).set_allow_instant_service(allowed)
    }
}

#[cfg(test)]
mod tests {
    use service_manager::fake::FakeBinder;

    use super::*;
    use crate::LocalIntelligenceService;

    fn proxy(service: Arc<LocalIntelligenceService>) -> (IntelligenceServiceProxy, SpBinder) {
        let binder: SpBinder = Arc::new(FakeBinder::new(
            crate::SERVICE_NAME,
            Arc::new(IntelligenceServiceStub::new(service)),
        ));
        (IntelligenceServiceProxy::new(Arc::clone(&binder)), binder)
    }

    #[test]
    fn flag_round_trips_through_stub() {
        let local = Arc::new(LocalIntelligenceService::default());
        let (proxy, _binder) = proxy(Arc::clone(&local));
        proxy.set_allow_instant_service(true);
        assert!(local.get_allow_instant_service());
        assert!(proxy.get_allow_instant_service());
    }

    #[test]
    fn list_sessions_through_stub() {
        let local = Arc::new(LocalIntelligenceService::default());
        local.add_session(UserId(0), "s1");
        let (proxy, _binder) = proxy(local);

        let (tx, rx) = channel();
        proxy.list_sessions(
            UserId::ALL,
            ResultReceiver::new(move |code, data| tx.send((code, data)).unwrap()),
        );
        let (code, data) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(code, 0);
        assert_eq!(data.sessions, Some(vec!["s1".to_owned()]));
    }

    #[test]
    fn failed_call_drops_receiver() {
        let local = Arc::new(LocalIntelligenceService::default());
        let binder = Arc::new(FakeBinder::new(
            crate::SERVICE_NAME,
            Arc::new(IntelligenceServiceStub::new(local)),
        ));
        binder.set_fail_transactions(true);
        let proxy = IntelligenceServiceProxy::new(binder);

        let (tx, rx) = channel::<i32>();
        proxy.destroy_sessions(
            UserId::ALL,
            ResultReceiver::new(move |code, _| tx.send(code).unwrap()),
        );
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
        assert!(!proxy.get_allow_instant_service());
    }
}
