//! Throttled external notifications.
//!
//! `maybe_send` is called on the frame-processing path. It only checks the
//! per-region cooldown and queues the payload; delivery (with bounded
//! retries) runs on a background worker so network latency never stalls a
//! camera. The cooldown clock starts at dispatch, not at confirmed delivery,
//! and retries of an accepted payload are not subject to it.

#[cfg(feature = "telegram")]
pub mod telegram;

use anyhow::Result;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::TelegramSettings;
use crate::{lock, EventKind};

/// Delivery backend. Implementations must bound each attempt by a timeout.
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &'static str;
    fn deliver(&self, image: &[u8], caption: &str) -> Result<()>;
}

/// A payload accepted by the throttler and waiting for (re)delivery.
#[derive(Clone, Debug)]
pub struct PendingNotification {
    pub region: String,
    pub image: Vec<u8>,
    pub caption: String,
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub failed: u64,
    pub throttled: u64,
    pub retries: u64,
}

/// `[ENTRY] Camera: <name> | Region: <region> | Count: <n>`
pub fn caption(kind: EventKind, camera_name: &str, region_name: &str, count: usize) -> String {
    format!(
        "[{}] Camera: {} | Region: {} | Count: {}",
        kind.as_str(),
        camera_name,
        region_name,
        count
    )
}

pub struct NotificationThrottler {
    cooldown: Duration,
    last_send: Mutex<HashMap<String, Instant>>,
    stats: Arc<Mutex<DeliveryStats>>,
    queue: Mutex<Option<mpsc::Sender<PendingNotification>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationThrottler {
    /// Start a throttler delivering through `transport`. `retry_count` is the
    /// number of extra attempts after a failed first one.
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        cooldown: Duration,
        retry_count: u32,
    ) -> Self {
        let stats = Arc::new(Mutex::new(DeliveryStats::default()));
        let (tx, rx) = mpsc::channel::<PendingNotification>();
        let worker = {
            let stats = stats.clone();
            std::thread::spawn(move || {
                for pending in rx {
                    deliver_with_retry(transport.as_ref(), pending, retry_count, &stats);
                }
            })
        };
        Self {
            cooldown,
            last_send: Mutex::new(HashMap::new()),
            stats,
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// A throttler that never sends anything.
    pub fn disabled() -> Self {
        Self {
            cooldown: Duration::ZERO,
            last_send: Mutex::new(HashMap::new()),
            stats: Arc::new(Mutex::new(DeliveryStats::default())),
            queue: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Build from settings; disabled settings give a no-op throttler.
    pub fn from_settings(settings: &TelegramSettings) -> Result<Self> {
        if !settings.enabled {
            log::info!("notifications disabled");
            return Ok(Self::disabled());
        }
        settings.validate()?;
        Self::start_telegram(settings)
    }

    #[cfg(feature = "telegram")]
    fn start_telegram(settings: &TelegramSettings) -> Result<Self> {
        let transport = telegram::TelegramTransport::new(
            &settings.bot_token,
            &settings.chat_id,
            Duration::from_millis(settings.timeout_ms),
        )?;
        log::info!(
            "telegram notifications enabled (cooldown {} ms, {} retries)",
            settings.cooldown_ms,
            settings.retry_count
        );
        Ok(Self::new(
            Arc::new(transport),
            Duration::from_millis(settings.cooldown_ms),
            settings.retry_count,
        ))
    }

    #[cfg(not(feature = "telegram"))]
    fn start_telegram(_settings: &TelegramSettings) -> Result<Self> {
        log::warn!("telegram enabled in config but built without the `telegram` feature");
        Ok(Self::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.queue).is_some()
    }

    /// Queue a notification for `region` unless it is inside its cooldown.
    /// Returns whether a dispatch was attempted.
    pub fn maybe_send(&self, region: &str, image: Vec<u8>, caption: String) -> bool {
        self.maybe_send_at(region, image, caption, Instant::now())
    }

    pub fn maybe_send_at(&self, region: &str, image: Vec<u8>, caption: String, now: Instant) -> bool {
        let queue = lock(&self.queue);
        let Some(tx) = queue.as_ref() else {
            return false;
        };

        {
            let mut last_send = lock(&self.last_send);
            if let Some(last) = last_send.get(region) {
                if now.saturating_duration_since(*last) < self.cooldown {
                    lock(&self.stats).throttled += 1;
                    log::debug!("notification for region '{}' throttled", region);
                    return false;
                }
            }
            last_send.insert(region.to_string(), now);
        }

        let pending = PendingNotification {
            region: region.to_string(),
            image,
            caption,
            attempts: 0,
        };
        if tx.send(pending).is_err() {
            log::warn!("notification worker is gone; dropping message for '{}'", region);
            return false;
        }
        lock(&self.stats).dispatched += 1;
        true
    }

    pub fn stats(&self) -> DeliveryStats {
        *lock(&self.stats)
    }

    /// Stop accepting notifications and wait for queued ones to finish.
    pub fn shutdown(&self) {
        drop(lock(&self.queue).take());
        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                log::error!("notification worker panicked");
            }
        }
    }
}

impl Drop for NotificationThrottler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver_with_retry(
    transport: &dyn NotificationTransport,
    mut pending: PendingNotification,
    retry_count: u32,
    stats: &Mutex<DeliveryStats>,
) {
    let max_attempts = retry_count.saturating_add(1);
    while pending.attempts < max_attempts {
        pending.attempts += 1;
        if pending.attempts > 1 {
            lock(stats).retries += 1;
        }
        match transport.deliver(&pending.image, &pending.caption) {
            Ok(()) => {
                lock(stats).delivered += 1;
                log::info!(
                    "{} notification for '{}' delivered (attempt {})",
                    transport.name(),
                    pending.region,
                    pending.attempts
                );
                return;
            }
            Err(e) => log::warn!(
                "{} notification for '{}' failed (attempt {}/{}): {:#}",
                transport.name(),
                pending.region,
                pending.attempts,
                max_attempts,
                e
            ),
        }
    }
    lock(stats).failed += 1;
    log::error!(
        "giving up on {} notification for '{}' after {} attempts",
        transport.name(),
        pending.region,
        pending.attempts
    );
}
