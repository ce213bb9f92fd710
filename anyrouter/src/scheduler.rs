use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::future::Future;
use std::time::Duration;

/// Longest single sleep. The wall clock is read again after each one, so a
/// machine that was suspended still runs the job on waking.
const MAX_SLEEP: Duration = Duration::from_secs(3600);

/// Daily run time in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    pub hour: u32,
    pub minute: u32,
}

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32) -> anyhow::Result<Self> {
        if hour > 23 || minute > 59 {
            anyhow::bail!("Invalid schedule time {:02}:{:02}", hour, minute);
        }
        Ok(Self { hour, minute })
    }
}

impl std::fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Next instant at `time` strictly after `now`: today if still ahead,
/// otherwise tomorrow.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, time: ScheduleTime) -> DateTime<Tz> {
    let at = NaiveTime::from_hms_opt(time.hour, time.minute, 0).unwrap_or(NaiveTime::MIN);
    let tz = now.timezone();
    let today = now.date_naive();

    let mut day = today;
    loop {
        // Skip local times that fall into a DST gap.
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return now.clone(),
        };
    }
}

/// Wait until the next scheduled time, then run `job`, forever. Returns when
/// `shutdown` resolves while waiting; a job already running is never cut
/// short.
pub async fn run_daily<J, Fut, S>(time: ScheduleTime, job: J, shutdown: S)
where
    J: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    run_daily_with_clock(time, Local::now, job, shutdown).await
}

pub async fn run_daily_with_clock<Tz, C, J, Fut, S>(
    time: ScheduleTime,
    clock: C,
    mut job: J,
    shutdown: S,
) where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
    C: Fn() -> DateTime<Tz>,
    J: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let next = next_occurrence(&clock(), time);
        tracing::info!(next_run = %next.to_rfc3339(), "Next sign-in scheduled");

        loop {
            let wait = match (next.clone() - clock()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining.min(MAX_SLEEP),
                _ => break,
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping scheduler");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        job().await;
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
