// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filesystem watch that reloads the policy when the user file changes.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::engine_core::constants::watcher::DEBOUNCE_MS;
use crate::policy::store::ConfigStore;

enum Signal {
    Changed,
    Stop,
}

/// Background reload thread. Dropping it stops the thread.
pub struct ConfigWatcher {
    watcher: Option<RecommendedWatcher>,
    tx: Sender<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Watch the user file of `store`. Returns `None` when there is no user
    /// file path or its directory cannot be watched.
    pub fn spawn(store: Arc<ConfigStore>) -> Option<Self> {
        let path = store.user_path()?;
        let file_name = path.file_name()?.to_os_string();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };

        let (tx, rx) = mpsc::channel::<Signal>();

        let event_tx = tx.clone();
        let mut watcher = match notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if is_relevant(&event, &file_name) => {
                    let _ = event_tx.send(Signal::Changed);
                }
                Ok(_) => {}
                Err(e) => warn!("policy watcher error: {}", e),
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!("cannot create policy watcher: {}", e);
                return None;
            }
        };

        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!("failed to watch policy directory {}: {}", dir.display(), e);
            return None;
        }

        let handle = std::thread::Builder::new()
            .name("lilith-scan-policy-watcher".to_string())
            .spawn(move || run(store, rx));
        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                error!("failed to start policy watcher thread: {}", e);
                return None;
            }
        };

        info!("policy watcher started on {}", path.display());
        Some(Self {
            watcher: Some(watcher),
            tx,
            handle: Some(handle),
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        // Stop filesystem events first so nothing races the stop signal
        self.watcher.take();
        let _ = self.tx.send(Signal::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

fn run(store: Arc<ConfigStore>, rx: mpsc::Receiver<Signal>) {
    let quiet = Duration::from_millis(DEBOUNCE_MS);
    loop {
        match rx.recv() {
            Ok(Signal::Changed) => {}
            Ok(Signal::Stop) | Err(_) => return,
        }

        // Wait for the burst of events from one save to settle
        loop {
            match rx.recv_timeout(quiet) {
                Ok(Signal::Changed) => continue,
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        info!("policy file changed, reloading");
        if let Err(e) = store.reload() {
            error!("policy reload failed, previous configuration stays active: {}", e);
        }
    }
}
