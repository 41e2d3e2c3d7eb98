use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::advisory::{AdvisoryError, AdvisoryReply, AdvisoryRequest, AdvisoryTargets};
use crate::level::GHOST_IDS;

const CHANNEL_CAPACITY: usize = 4;
const MAX_INTERCEPT_LEAD: i32 = 6;

/// Something that can suggest chase targets. Implementations may be slow or
/// fail; the runner bounds every call with a timeout.
pub trait AdvisoryProvider: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn suggest(&self, request: AdvisoryRequest) -> BoxFuture<'static, Result<Value, AdvisoryError>>;
}

/// Local interception heuristic: odd ids lead the player by half their
/// distance, even ids cut off the retreat behind it.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicAdvisor;

impl HeuristicAdvisor {
    pub fn compute(&self, request: &AdvisoryRequest) -> Value {
        let mut targets = [request.player; 4];
        for (slot, id) in targets.iter_mut().zip(GHOST_IDS) {
            let Some(ghost) = request.ghosts.iter().find(|ghost| ghost.id == id) else {
                continue;
            };
            let gap = (ghost.x - request.player.x).abs() + (ghost.y - request.player.y).abs();
            let lead = (gap / 2).min(MAX_INTERCEPT_LEAD);
            *slot = if id % 2 == 1 {
                request.player.ahead(request.player_dir, lead)
            } else {
                request.player.ahead(request.player_dir.opposite(), lead / 2)
            };
        }
        AdvisoryTargets::new(targets).to_json()
    }
}

impl AdvisoryProvider for HeuristicAdvisor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn suggest(&self, request: AdvisoryRequest) -> BoxFuture<'static, Result<Value, AdvisoryError>> {
        let value = self.compute(&request);
        futures_util::future::ready(Ok(value)).boxed()
    }
}

/// Runs an external program per request: request JSON on stdin, reply JSON
/// on stdout. The child is killed if the call is cancelled.
#[derive(Clone, Debug)]
pub struct CommandAdvisor {
    program: String,
    args: Vec<String>,
}

impl CommandAdvisor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Whitespace-separated command line; `None` when blank.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl AdvisoryProvider for CommandAdvisor {
    fn name(&self) -> &'static str {
        "command"
    }

    fn suggest(&self, request: AdvisoryRequest) -> BoxFuture<'static, Result<Value, AdvisoryError>> {
        let program = self.program.clone();
        let args = self.args.clone();
        async move {
            let payload = serde_json::to_vec(&request).map_err(|_| AdvisoryError::Malformed)?;
            let mut child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| AdvisoryError::Transport(err.to_string()))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&payload)
                    .await
                    .map_err(|err| AdvisoryError::Transport(err.to_string()))?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|err| AdvisoryError::Transport(err.to_string()))?;
            if !output.status.success() {
                return Err(AdvisoryError::Transport(format!(
                    "{program} exited with {}",
                    output.status
                )));
            }
            serde_json::from_slice(&output.stdout).map_err(|_| AdvisoryError::Malformed)
        }
        .boxed()
    }
}

/// Host side of the advisory task. Every operation is non-blocking so the
/// tick loop never waits on a provider.
pub struct AdvisorHandle {
    requests: mpsc::Sender<AdvisoryRequest>,
    replies: mpsc::Receiver<AdvisoryReply>,
}

impl AdvisorHandle {
    pub fn submit(&self, request: AdvisoryRequest) -> bool {
        match self.requests.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                debug!(generation = request.generation, "advisor queue full");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn try_recv(&mut self) -> Option<AdvisoryReply> {
        self.replies.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<AdvisoryReply> {
        self.replies.recv().await
    }
}

pub fn spawn_advisor(provider: Arc<dyn AdvisoryProvider>, timeout: Duration) -> AdvisorHandle {
    let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (reply_tx, reply_rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run_advisor(provider, timeout, request_rx, reply_tx));
    AdvisorHandle {
        requests: request_tx,
        replies: reply_rx,
    }
}

enum CallOutcome {
    Finished(Result<Value, AdvisoryError>),
    Superseded(Option<AdvisoryRequest>),
}

async fn run_advisor(
    provider: Arc<dyn AdvisoryProvider>,
    timeout: Duration,
    mut requests: mpsc::Receiver<AdvisoryRequest>,
    replies: mpsc::Sender<AdvisoryReply>,
) {
    let mut next = requests.recv().await;
    while let Some(request) = next.take() {
        let generation = request.generation;
        let call = tokio::time::timeout(timeout, provider.suggest(request));
        tokio::pin!(call);

        let outcome = tokio::select! {
            finished = &mut call => CallOutcome::Finished(
                finished.unwrap_or(Err(AdvisoryError::TimedOut)),
            ),
            newer = requests.recv() => CallOutcome::Superseded(newer),
        };

        match outcome {
            CallOutcome::Finished(result) => {
                if let Err(err) = &result {
                    warn!(provider = provider.name(), generation, error = %err, "advisory call failed");
                }
                if replies.send(AdvisoryReply { generation, result }).await.is_err() {
                    break;
                }
                next = requests.recv().await;
            }
            CallOutcome::Superseded(Some(newer)) => {
                debug!(
                    generation,
                    superseded_by = newer.generation,
                    "cancelling advisory call"
                );
                next = Some(newer);
            }
            CallOutcome::Superseded(None) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::{parse_advisory, AdvisoryGhost};
    use crate::types::{Direction, Vec2};

    fn request(generation: u64) -> AdvisoryRequest {
        AdvisoryRequest {
            generation,
            player: Vec2::new(10, 10),
            player_dir: Direction::Right,
            ghosts: vec![
                AdvisoryGhost { id: 1, x: 2, y: 10 },
                AdvisoryGhost { id: 2, x: 10, y: 2 },
                AdvisoryGhost { id: 3, x: 11, y: 10 },
                AdvisoryGhost { id: 4, x: 10, y: 30 },
            ],
        }
    }

    /// Sleeps `delay(generation)` then answers with the heuristic.
    struct DelayedAdvisor {
        delay: fn(u64) -> Duration,
    }

    impl AdvisoryProvider for DelayedAdvisor {
        fn name(&self) -> &'static str {
            "delayed"
        }

        fn suggest(
            &self,
            request: AdvisoryRequest,
        ) -> BoxFuture<'static, Result<Value, AdvisoryError>> {
            let delay = (self.delay)(request.generation);
            async move {
                tokio::time::sleep(delay).await;
                Ok(HeuristicAdvisor.compute(&request))
            }
            .boxed()
        }
    }

    #[test]
    fn heuristic_targets_are_valid_and_lead_the_player() {
        let value = HeuristicAdvisor.compute(&request(1));
        let targets = parse_advisory(&value).expect("heuristic output validates");
        // ghost 1 is 8 away: leads by 4
        assert_eq!(targets.get(1), Some(Vec2::new(14, 10)));
        // ghost 2 is 8 away: trails by 2
        assert_eq!(targets.get(2), Some(Vec2::new(8, 10)));
        // ghost 3 is adjacent: no lead
        assert_eq!(targets.get(3), Some(Vec2::new(10, 10)));
        // ghost 4 lead is capped at 6, trailing by 3
        assert_eq!(targets.get(4), Some(Vec2::new(7, 10)));
    }

    #[test]
    fn command_line_parsing() {
        assert!(CommandAdvisor::from_command_line("   ").is_none());
        let advisor = CommandAdvisor::from_command_line("python3 advise.py --fast")
            .expect("non-blank command");
        assert_eq!(advisor.program, "python3");
        assert_eq!(advisor.args, vec!["advise.py", "--fast"]);
    }

    #[tokio::test]
    async fn replies_carry_the_request_generation() {
        let mut handle = spawn_advisor(Arc::new(HeuristicAdvisor), Duration::from_secs(1));
        assert!(handle.submit(request(7)));
        let reply = tokio::time::timeout(Duration::from_secs(2), handle.recv())
            .await
            .expect("reply in time")
            .expect("runner alive");
        assert_eq!(reply.generation, 7);
        assert!(parse_advisory(&reply.result.expect("heuristic succeeds")).is_ok());
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = DelayedAdvisor {
            delay: |_| Duration::from_millis(500),
        };
        let mut handle = spawn_advisor(Arc::new(provider), Duration::from_millis(20));
        handle.submit(request(1));
        let reply = tokio::time::timeout(Duration::from_secs(2), handle.recv())
            .await
            .expect("timeout reply in time")
            .expect("runner alive");
        assert_eq!(reply.generation, 1);
        assert_eq!(reply.result.unwrap_err(), AdvisoryError::TimedOut);
    }

    #[tokio::test]
    async fn newer_request_cancels_in_flight_call() {
        let provider = DelayedAdvisor {
            delay: |generation| {
                if generation == 1 {
                    Duration::from_millis(400)
                } else {
                    Duration::from_millis(10)
                }
            },
        };
        let mut handle = spawn_advisor(Arc::new(provider), Duration::from_secs(1));
        handle.submit(request(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.submit(request(2));

        let reply = tokio::time::timeout(Duration::from_secs(2), handle.recv())
            .await
            .expect("reply in time")
            .expect("runner alive");
        assert_eq!(reply.generation, 2);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(handle.try_recv().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_advisor_round_trips_through_a_process() {
        let script = r#"cat > /dev/null; printf '{"targets":{"1":{"x":1,"y":1},"2":{"x":2,"y":2},"3":{"x":3,"y":3},"4":{"x":4,"y":4}}}'"#;
        let advisor = CommandAdvisor::new("sh", vec!["-c".to_string(), script.to_string()]);
        let value = advisor.suggest(request(3)).await.expect("command succeeds");
        let targets = parse_advisory(&value).expect("valid reply");
        assert_eq!(targets.get(4), Some(Vec2::new(4, 4)));

        let failing = CommandAdvisor::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        assert!(matches!(
            failing.suggest(request(4)).await,
            Err(AdvisoryError::Transport(_))
        ));

        let garbage = CommandAdvisor::new(
            "sh",
            vec!["-c".to_string(), "cat > /dev/null; echo nope".to_string()],
        );
        assert_eq!(
            garbage.suggest(request(5)).await.unwrap_err(),
            AdvisoryError::Malformed
        );
    }
}
