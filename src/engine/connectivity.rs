// Edge Engine — Connectivity State Machine
//
// Two states, ONLINE and OFFLINE. Platform signals move between them:
//
//   signal               from      to        transition
//   Online               OFFLINE   ONLINE    CameOnline   → drain + flush
//   Offline              ONLINE    OFFLINE   WentOffline
//   VisibilityRegained   OFFLINE   ONLINE    CameOnline   (platform says online)
//   VisibilityRegained   ONLINE    ONLINE    Resumed      → drain + flush
//   VisibilityRegained   ONLINE    OFFLINE   WentOffline  (platform says offline)
//
// Repeated signals for the current state are no-ops, so duplicated platform
// events never cause duplicated drain passes.
//
// `ManualConnectivity` is a channel-backed `ConnectivitySource` for hosts
// that push state changes themselves (and for tests).

use crate::atoms::traits::ConnectivitySource;
use crate::atoms::types::{ConnectivityState, NetworkInfo, PlatformSignal};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
    /// Already online; the host regained visibility.
    Resumed,
}

pub struct ConnectivityMonitor {
    online: AtomicBool,
    last_transition: Mutex<Option<DateTime<Utc>>>,
    last_activity: Mutex<DateTime<Utc>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        ConnectivityMonitor {
            online: AtomicBool::new(initially_online),
            last_transition: Mutex::new(None),
            last_activity: Mutex::new(Utc::now()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectivityState {
        if self.is_online() {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }

    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        *self.last_transition.lock()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }

    /// Record host activity (used in heartbeats).
    pub fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    /// Apply a platform signal. `platform_online` is the platform's current
    /// view, consulted only for visibility regain.
    pub fn apply(&self, signal: PlatformSignal, platform_online: bool) -> Option<Transition> {
        self.touch();
        let transition = match signal {
            PlatformSignal::Online => self.set(true).then_some(Transition::CameOnline),
            PlatformSignal::Offline => self.set(false).then_some(Transition::WentOffline),
            PlatformSignal::VisibilityRegained if platform_online => {
                if self.set(true) {
                    Some(Transition::CameOnline)
                } else {
                    Some(Transition::Resumed)
                }
            }
            PlatformSignal::VisibilityRegained => self.set(false).then_some(Transition::WentOffline),
        };

        match transition {
            Some(Transition::Resumed) => debug!("[connectivity] Visibility regained while online"),
            Some(t) => {
                *self.last_transition.lock() = Some(Utc::now());
                info!("[connectivity] {:?} → {:?}", t, self.state());
            }
            None => debug!("[connectivity] {:?} ignored (already {:?})", signal, self.state()),
        }
        transition
    }

    /// Returns true if the state actually changed.
    fn set(&self, online: bool) -> bool {
        self.online
            .compare_exchange(!online, online, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

// ── ManualConnectivity ─────────────────────────────────────────────────────

/// A `ConnectivitySource` driven by explicit calls.
pub struct ManualConnectivity {
    online: AtomicBool,
    network: Mutex<NetworkInfo>,
    subscribers: Mutex<Vec<UnboundedSender<PlatformSignal>>>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        ManualConnectivity {
            online: AtomicBool::new(online),
            network: Mutex::new(NetworkInfo::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.emit(if online { PlatformSignal::Online } else { PlatformSignal::Offline });
    }

    /// Flip the platform flag without emitting (e.g. a change the platform
    /// failed to report), so only a later visibility check notices.
    pub fn set_online_silently(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn regain_visibility(&self) {
        self.emit(PlatformSignal::VisibilityRegained);
    }

    pub fn set_network_info(&self, info: NetworkInfo) {
        *self.network.lock() = info;
    }

    fn emit(&self, signal: PlatformSignal) {
        self.subscribers.lock().retain(|tx| tx.send(signal).is_ok());
    }
}

impl ConnectivitySource for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn network_info(&self) -> NetworkInfo {
        self.network.lock().clone()
    }

    fn subscribe(&self) -> UnboundedReceiver<PlatformSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
