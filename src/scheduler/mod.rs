//! Autonomous posting.
//!
//! Every tick the scheduler checks the sleep window once, then walks the
//! channel registrations. Each channel gets its own activation roll and is
//! answered from the messages that arrived after its marker. Failures are
//! collected and handled after the sweep: a vanished guild or channel loses
//! its registration, a guild without persona facts is reseeded, anything else
//! is only logged.

pub mod settings;
pub mod watch;

use arc_swap::ArcSwap;
use chrono::{Local, NaiveTime};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::watch as signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::MarkerCache;
use crate::error::{RelayError, ResourceKind};
use crate::responder::{ChannelOutcome, Responder};
use crate::store::ChannelRegistration;

pub use settings::{SchedulerSettings, SleepWindow};

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sleeping: bool,
    /// Channels that passed the activation roll.
    pub attempted: usize,
    pub responded: usize,
    /// Channels whose roll was above the activation chance.
    pub skipped: usize,
    pub removed: Vec<ChannelRegistration>,
    pub reseeded: Vec<u64>,
    pub failures: usize,
}

pub struct AutonomousPostingScheduler {
    responder: Arc<Responder>,
    markers: MarkerCache,
    settings: Arc<ArcSwap<SchedulerSettings>>,
}

/// Stops the timer loop started by [`AutonomousPostingScheduler::spawn`].
pub struct SchedulerHandle {
    shutdown: signal::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Halts the timer, then waits for a tick that is already running.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}

fn roll_percent() -> u32 {
    rand::rng().random_range(1..=100)
}

impl AutonomousPostingScheduler {
    pub fn new(
        responder: Arc<Responder>,
        markers: MarkerCache,
        settings: Arc<ArcSwap<SchedulerSettings>>,
    ) -> Self {
        Self {
            responder,
            markers,
            settings,
        }
    }

    pub fn settings(&self) -> Arc<SchedulerSettings> {
        self.settings.load_full()
    }

    /// One tick against the local clock and a uniform roll in `1..=100`.
    pub async fn run_tick(&self) -> TickReport {
        self.tick_at(Local::now().time(), &roll_percent).await
    }

    pub async fn tick_at(
        &self,
        now: NaiveTime,
        roll: &(dyn Fn() -> u32 + Send + Sync),
    ) -> TickReport {
        let settings = self.settings.load_full();
        let mut report = TickReport::default();

        if let Some(window) = settings.sleep_window.filter(|w| w.contains(now)) {
            info!(
                "Sleeping until {}, skipping tick at {}",
                window.end().format("%H:%M"),
                now.format("%H:%M")
            );
            report.sleeping = true;
            return report;
        }

        let registrations = match self.responder.store().registrations().await {
            Ok(registrations) => registrations,
            Err(e) => {
                error!("Failed to load channel registrations: {}", e);
                report.failures += 1;
                return report;
            }
        };

        let mut failures: Vec<(ChannelRegistration, RelayError)> = Vec::new();

        for registration in registrations {
            let (guild_id, channel_id) = (registration.guild_id, registration.channel_id);

            let value = roll();
            if value > settings.chance {
                debug!(guild_id, channel_id, "Rolled {} over chance {}, skipping", value, settings.chance);
                report.skipped += 1;
                continue;
            }
            report.attempted += 1;

            let marker = self.markers.get(guild_id, channel_id);
            match self
                .responder
                .respond_to_channel(guild_id, channel_id, marker)
                .await
            {
                Ok(ChannelOutcome::Responded {
                    newest_message_id, ..
                }) => {
                    report.responded += 1;
                    if let Some(id) = newest_message_id {
                        self.markers.advance(guild_id, channel_id, id);
                    }
                }
                Ok(ChannelOutcome::NothingNew) => {}
                Ok(ChannelOutcome::NoResponse { reason }) => {
                    warn!(guild_id, channel_id, "No autonomous message produced: {}", reason);
                    report.failures += 1;
                }
                Err(e) => failures.push((registration, e)),
            }
        }

        for (registration, e) in failures {
            report.failures += 1;
            self.handle_failure(registration, e, &mut report).await;
        }

        info!(
            attempted = report.attempted,
            responded = report.responded,
            skipped = report.skipped,
            removed = report.removed.len(),
            reseeded = report.reseeded.len(),
            failures = report.failures,
            "Scheduler tick finished"
        );
        report
    }

    async fn handle_failure(
        &self,
        registration: ChannelRegistration,
        e: RelayError,
        report: &mut TickReport,
    ) {
        let (guild_id, channel_id) = (registration.guild_id, registration.channel_id);

        match e.missing_resource() {
            Some(ResourceKind::Guild) | Some(ResourceKind::Channel) => {
                warn!(guild_id, channel_id, "Removing registration: {}", e);
                match self.responder.store().unregister(guild_id, channel_id).await {
                    Ok(_) => {
                        self.markers.forget(guild_id, channel_id);
                        report.removed.push(registration);
                    }
                    Err(err) => error!(guild_id, channel_id, "Failed to remove registration: {}", err),
                }
            }
            Some(ResourceKind::PersonaFacts) => {
                if report.reseeded.contains(&guild_id) {
                    return;
                }
                warn!(guild_id, "Guild has no persona facts, reseeding defaults");
                match self.responder.reset_persona_facts(guild_id).await {
                    Ok(_) => report.reseeded.push(guild_id),
                    Err(err) => error!(guild_id, "Failed to reseed persona facts: {}", err),
                }
            }
            None => error!(guild_id, channel_id, "Autonomous response failed: {}", e),
        }
    }

    /// Runs the first tick immediately, then one per interval until shut down.
    /// The interval is read from the current settings before every wait.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, mut stop) = signal::channel(false);

        let task = tokio::spawn(async move {
            info!("Scheduler started");
            loop {
                self.run_tick().await;

                let interval = self.settings.load().interval;
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => break,
                }
            }
            info!("Scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::llm::client::testing::FakeCompletion;
    use crate::platform::testing::FakePlatform;
    use crate::platform::ChannelMessage;
    use crate::responder::testing::{memory_db, responder};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct Fixture {
        db: Database,
        platform: Arc<FakePlatform>,
        completion: Arc<FakeCompletion>,
        markers: MarkerCache,
        scheduler: AutonomousPostingScheduler,
    }

    fn fixture(settings: SchedulerSettings) -> Fixture {
        let db = memory_db();
        let platform = Arc::new(FakePlatform::new());
        let completion = Arc::new(FakeCompletion::replying("take it easy"));
        let markers = MarkerCache::new(100);
        let scheduler = AutonomousPostingScheduler::new(
            Arc::new(responder(&db, platform.clone(), completion.clone())),
            markers.clone(),
            Arc::new(ArcSwap::from_pointee(settings)),
        );
        Fixture {
            db,
            platform,
            completion,
            markers,
            scheduler,
        }
    }

    fn settings(chance: u32) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(3600),
            chance,
            sleep_window: SleepWindow::parse("22:00", "09:00").unwrap(),
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn msg(id: u64, content: &str) -> ChannelMessage {
        ChannelMessage {
            id,
            author_id: 2,
            author_name: "someone".to_string(),
            content: content.to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
            from_self: false,
        }
    }

    /// Registered channel with facts, emotes and one message.
    fn active_channel(f: &Fixture, guild_id: u64, channel_id: u64) {
        f.db.add_channel_registration(guild_id, channel_id).unwrap();
        f.db.add_persona_facts(guild_id, &["You like trains.".to_string()])
            .unwrap();
        f.platform.add_channel(guild_id, channel_id);
        f.platform.set_emotes(guild_id, Vec::new());
        f.platform.push_message(channel_id, msg(channel_id * 100, "anyone here"));
    }

    #[tokio::test]
    async fn test_no_completion_during_sleep_window() {
        let f = fixture(settings(100));
        active_channel(&f, 1, 2);

        for now in [t(22, 30), t(23, 59), t(0, 0), t(3, 15), t(8, 59)] {
            for value in [1, 50, 100] {
                let report = f.scheduler.tick_at(now, &move || value).await;
                assert!(report.sleeping);
                assert_eq!(report.attempted, 0);
            }
        }

        assert_eq!(f.completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_roll_above_chance_skips_channel() {
        let f = fixture(settings(30));
        active_channel(&f, 1, 2);

        let report = f.scheduler.tick_at(t(14, 0), &|| 31).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.attempted, 0);
        assert_eq!(f.completion.call_count(), 0);

        let report = f.scheduler.tick_at(t(14, 0), &|| 30).await;
        assert_eq!(report.responded, 1);
    }

    #[tokio::test]
    async fn test_missing_channel_removes_only_that_registration() {
        let f = fixture(settings(100));
        active_channel(&f, 1, 2);
        active_channel(&f, 3, 4);
        f.db.add_channel_registration(1, 9).unwrap();

        let report = f.scheduler.tick_at(t(14, 0), &|| 1).await;

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].key(), "1:9");
        assert_eq!(report.responded, 2);

        let remaining: Vec<String> = f
            .db
            .list_channel_registrations()
            .unwrap()
            .iter()
            .map(|r| r.key())
            .collect();
        assert_eq!(remaining, vec!["1:2", "3:4"]);
    }

    #[tokio::test]
    async fn test_vanished_guild_removes_registration() {
        let f = fixture(settings(100));
        f.db.add_channel_registration(7, 8).unwrap();
        f.db.add_persona_facts(7, &["You like trains.".to_string()])
            .unwrap();

        let report = f.scheduler.tick_at(t(14, 0), &|| 1).await;

        assert_eq!(report.removed.len(), 1);
        assert!(f.db.list_channel_registrations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_facts_reseeds_and_keeps_registration() {
        let f = fixture(settings(100));
        f.db.add_channel_registration(5, 6).unwrap();
        f.db.add_channel_registration(5, 7).unwrap();
        f.platform.add_channel(5, 6);
        f.platform.add_channel(5, 7);

        let report = f.scheduler.tick_at(t(14, 0), &|| 1).await;

        assert_eq!(report.reseeded, vec![5]);
        assert!(report.removed.is_empty());
        assert_eq!(f.db.list_channel_registrations().unwrap().len(), 2);
        assert_eq!(
            f.db.list_persona_facts(5).unwrap().len(),
            crate::persona::DEFAULT_FACTS.len()
        );
        assert_eq!(f.completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_tick_advances_marker() {
        let f = fixture(settings(30));
        f.db.add_channel_registration(1, 10).unwrap();
        f.db.add_persona_facts(1, &["You like trains.".to_string()])
            .unwrap();
        f.platform.add_channel(1, 10);
        f.platform.set_emotes(1, Vec::new());
        f.platform.push_message(10, msg(500, "already answered"));
        f.markers.advance(1, 10, 500);
        for (id, text) in [(503, "third"), (501, "first"), (502, "second")] {
            f.platform.push_message(10, msg(id, text));
        }

        let report = f.scheduler.tick_at(t(14, 0), &|| 10).await;

        assert_eq!(report.responded, 1);
        assert_eq!(f.completion.call_count(), 1);
        let request = f.completion.last_request().unwrap();
        assert_eq!(request.len(), 5);
        let history: Vec<&str> = request[1..4].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(history, vec!["first", "second", "third"]);
        assert_eq!(f.markers.get(1, 10), Some(503));

        // Nothing new since the marker: no second call.
        let report = f.scheduler.tick_at(t(14, 10), &|| 10).await;
        assert_eq!(report.responded, 0);
        assert_eq!(f.completion.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_dispatch_leaves_marker() {
        let f = fixture(settings(100));
        active_channel(&f, 1, 2);
        *f.platform.fail_sends.lock().unwrap() = true;

        let report = f.scheduler.tick_at(t(14, 0), &|| 1).await;

        assert_eq!(report.failures, 1);
        assert_eq!(f.markers.get(1, 2), None);
        assert_eq!(f.db.list_channel_registrations().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_loop_ticks_then_stops() {
        let mut no_sleep = settings(100);
        no_sleep.sleep_window = None;
        let f = fixture(no_sleep);
        active_channel(&f, 1, 2);

        let handle = Arc::new(f.scheduler).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(f.completion.call_count(), 1);
    }
}
