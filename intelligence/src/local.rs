// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-process session store used by `sysshim serve` and by tests.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;

use base::error;
use base::info;
use sync::Mutex;

use crate::IntelligenceService;
use crate::ResultData;
use crate::ResultReceiver;
use crate::UserId;

/// Pending sessions keyed by user.
///
/// Session commands complete on a separate thread, the way a real service answers through its
/// own binder threads.
pub struct LocalIntelligenceService {
    sessions: Mutex<BTreeMap<UserId, Vec<String>>>,
    current_user: UserId,
    allow_instant_service: AtomicBool,
}

impl LocalIntelligenceService {
    pub fn new(current_user: UserId) -> Self {
        LocalIntelligenceService {
            sessions: Mutex::new(BTreeMap::new()),
            current_user,
            allow_instant_service: AtomicBool::new(false),
        }
    }

    pub fn add_session(&self, user_id: UserId, session_id: impl Into<String>) {
        self.sessions
            .lock()
            .entry(self.resolve(user_id))
            .or_default()
            .push(session_id.into());
    }

    fn resolve(&self, user_id: UserId) -> UserId {
        if user_id == UserId::CURRENT {
            self.current_user
        } else {
            user_id
        }
    }

    /// Session ids for `user_id`, in user then insertion order.
    fn collect(&self, user_id: UserId, remove: bool) -> Vec<String> {
        let user_id = self.resolve(user_id);
        let mut sessions = self.sessions.lock();
        if user_id == UserId::ALL {
            let all = sessions.values().flatten().cloned().collect();
            if remove {
                sessions.clear();
            }
            all
        } else if remove {
            sessions.remove(&user_id).unwrap_or_default()
        } else {
            sessions.get(&user_id).cloned().unwrap_or_default()
        }
    }
}

impl Default for LocalIntelligenceService {
    fn default() -> Self {
        LocalIntelligenceService::new(UserId(0))
    }
}

// Detached: a reply that arrives after the caller stopped waiting goes to a receiver nobody
// reads.
fn reply(receiver: ResultReceiver, data: ResultData) {
    if let Err(e) = thread::Builder::new()
        .name("intelligence_reply".to_owned())
        .spawn(move || receiver.send(0, data))
    {
        error!("failed to spawn reply thread: {}", e);
    }
}

impl IntelligenceService for LocalIntelligenceService {
    fn list_sessions(&self, user_id: UserId, receiver: ResultReceiver) {
        let sessions = self.collect(user_id, false);
        reply(
            receiver,
            ResultData {
                sessions: Some(sessions),
            },
        );
    }

    fn destroy_sessions(&self, user_id: UserId, receiver: ResultReceiver) {
        let destroyed = self.collect(user_id, true);
        info!("destroyed {} sessions for user {}", destroyed.len(), user_id.0);
        reply(receiver, ResultData::default());
    }

    fn get_allow_instant_service(&self) -> bool {
        self.allow_instant_service.load(Ordering::SeqCst)
    }

    fn set_allow_instant_service(&self, allowed: bool) {
        self.allow_instant_service.store(allowed, Ordering::SeqCst);
    }
}
