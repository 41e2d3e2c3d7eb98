use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{ADVISORY_INTERVAL_MS, ADVISORY_VALIDITY_MS};
use crate::level::GHOST_IDS;
use crate::types::{AdvisoryStatus, Direction, Vec2};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdvisoryError {
    #[error("advisory payload is not a JSON object")]
    NotAnObject,
    #[error("advisory payload has no target for ghost {0}")]
    MissingGhost(u8),
    #[error("advisory target for ghost {ghost} has an invalid {axis} coordinate")]
    InvalidCoordinate { ghost: u8, axis: char },
    #[error("advisory provider timed out")]
    TimedOut,
    #[error("advisory provider failed: {0}")]
    Transport(String),
    #[error("advisory provider returned malformed output")]
    Malformed,
}

/// Validated override: one target per ghost id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvisoryTargets {
    targets: [Vec2; 4],
}

impl AdvisoryTargets {
    pub fn new(targets: [Vec2; 4]) -> Self {
        Self { targets }
    }

    pub fn get(&self, ghost_id: u8) -> Option<Vec2> {
        let idx = GHOST_IDS.iter().position(|id| *id == ghost_id)?;
        self.targets.get(idx).copied()
    }

    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (id, target) in GHOST_IDS.iter().zip(self.targets) {
            map.insert(
                id.to_string(),
                serde_json::json!({ "x": target.x, "y": target.y }),
            );
        }
        Value::Object(map)
    }
}

/// Accepts `{"1":{"x":..,"y":..},...,"4":{..}}`, optionally wrapped in
/// `{"targets": ...}`. All four ids must be present with i32 integers.
pub fn parse_advisory(value: &Value) -> Result<AdvisoryTargets, AdvisoryError> {
    let outer = value.as_object().ok_or(AdvisoryError::NotAnObject)?;
    let map = match outer.get("targets") {
        Some(inner) => inner.as_object().ok_or(AdvisoryError::NotAnObject)?,
        None => outer,
    };

    let mut targets = [Vec2::new(0, 0); 4];
    for (slot, id) in targets.iter_mut().zip(GHOST_IDS) {
        let entry = map
            .get(&id.to_string())
            .ok_or(AdvisoryError::MissingGhost(id))?;
        *slot = Vec2 {
            x: coordinate(entry, id, 'x')?,
            y: coordinate(entry, id, 'y')?,
        };
    }
    Ok(AdvisoryTargets { targets })
}

fn coordinate(entry: &Value, ghost: u8, axis: char) -> Result<i32, AdvisoryError> {
    entry
        .get(axis.to_string().as_str())
        .and_then(Value::as_i64)
        .and_then(|raw| i32::try_from(raw).ok())
        .ok_or(AdvisoryError::InvalidCoordinate { ghost, axis })
}

#[derive(Clone, Debug, Serialize)]
pub struct AdvisoryGhost {
    pub id: u8,
    pub x: i32,
    pub y: i32,
}

/// What a provider sees: the player and every ghost, tagged with the
/// generation the reply must echo.
#[derive(Clone, Debug, Serialize)]
pub struct AdvisoryRequest {
    pub generation: u64,
    pub player: Vec2,
    #[serde(rename = "playerDir")]
    pub player_dir: Direction,
    pub ghosts: Vec<AdvisoryGhost>,
}

#[derive(Clone, Debug)]
pub struct AdvisoryReply {
    pub generation: u64,
    pub result: Result<Value, AdvisoryError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdvisoryOptions {
    /// Minimum gap between two requests.
    pub interval: Duration,
    /// How long an accepted override stays usable.
    pub validity: Duration,
}

impl Default for AdvisoryOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(ADVISORY_INTERVAL_MS),
            validity: Duration::from_millis(ADVISORY_VALIDITY_MS),
        }
    }
}

/// Single-slot "latest advisory" cell read synchronously by the tick.
#[derive(Clone, Debug)]
pub struct AdvisorySlot {
    options: Option<AdvisoryOptions>,
    generation: u64,
    pending: Option<u64>,
    last_request_at: Option<Instant>,
    held: Option<(AdvisoryTargets, Instant)>,
    failed: bool,
}

impl AdvisorySlot {
    pub fn new(options: Option<AdvisoryOptions>) -> Self {
        Self {
            options,
            generation: 0,
            pending: None,
            last_request_at: None,
            held: None,
            failed: false,
        }
    }

    /// Issues a new generation when the interval has elapsed. The previous
    /// outstanding request, if any, is superseded.
    pub fn poll_request(
        &mut self,
        now: Instant,
        build: impl FnOnce(u64) -> AdvisoryRequest,
    ) -> Option<AdvisoryRequest> {
        let options = self.options?;
        if let Some(last) = self.last_request_at {
            if now.saturating_duration_since(last) < options.interval {
                return None;
            }
        }
        if let Some(previous) = self.pending {
            debug!(generation = previous, "advisory request superseded");
        }
        self.generation += 1;
        self.pending = Some(self.generation);
        self.last_request_at = Some(now);
        Some(build(self.generation))
    }

    /// Returns whether the reply was accepted as the new override.
    pub fn offer(&mut self, reply: AdvisoryReply, now: Instant) -> bool {
        if self.options.is_none() || self.pending != Some(reply.generation) {
            debug!(
                generation = reply.generation,
                current = self.generation,
                "dropping stale advisory reply"
            );
            return false;
        }
        self.pending = None;

        match reply.result.and_then(|value| parse_advisory(&value)) {
            Ok(targets) => {
                self.held = Some((targets, now));
                self.failed = false;
                true
            }
            Err(err) => {
                warn!(generation = reply.generation, error = %err, "advisory reply rejected");
                self.held = None;
                self.failed = true;
                false
            }
        }
    }

    /// Drops the held override and orphans any in-flight request.
    pub fn invalidate(&mut self) {
        self.held = None;
        self.pending = None;
    }

    pub fn reset(&mut self) {
        self.invalidate();
        self.last_request_at = None;
        self.failed = false;
    }

    pub fn current(&self, now: Instant) -> Option<&AdvisoryTargets> {
        let options = self.options?;
        let (targets, accepted_at) = self.held.as_ref()?;
        (now.saturating_duration_since(*accepted_at) < options.validity).then_some(targets)
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.current(now).is_some()
    }

    pub fn status(&self, now: Instant) -> AdvisoryStatus {
        if self.options.is_none() {
            AdvisoryStatus::Offline
        } else if self.is_active(now) {
            AdvisoryStatus::Active
        } else if self.pending.is_some() {
            AdvisoryStatus::Thinking
        } else if self.failed {
            AdvisoryStatus::Error
        } else {
            AdvisoryStatus::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid_payload() -> Value {
        json!({
            "1": {"x": 1, "y": 2},
            "2": {"x": 3, "y": 4},
            "3": {"x": -5, "y": 6},
            "4": {"x": 7, "y": 8}
        })
    }

    fn request(generation: u64) -> AdvisoryRequest {
        AdvisoryRequest {
            generation,
            player: Vec2::new(0, 0),
            player_dir: Direction::Left,
            ghosts: Vec::new(),
        }
    }

    fn enabled_slot() -> AdvisorySlot {
        AdvisorySlot::new(Some(AdvisoryOptions {
            interval: Duration::from_millis(100),
            validity: Duration::from_millis(500),
        }))
    }

    #[test]
    fn parses_plain_and_wrapped_payloads() {
        let plain = parse_advisory(&valid_payload()).expect("plain payload");
        assert_eq!(plain.get(3), Some(Vec2::new(-5, 6)));
        assert_eq!(plain.get(5), None);

        let wrapped = parse_advisory(&json!({ "targets": valid_payload() })).expect("wrapped");
        assert_eq!(wrapped, plain);
        assert_eq!(parse_advisory(&plain.to_json()).expect("round trip"), plain);
    }

    #[test]
    fn rejects_partial_or_malformed_payloads() {
        let mut missing = valid_payload();
        if let Some(map) = missing.as_object_mut() {
            map.remove("2");
        }
        assert_eq!(
            parse_advisory(&missing).unwrap_err(),
            AdvisoryError::MissingGhost(2)
        );

        assert_eq!(
            parse_advisory(&json!({})).unwrap_err(),
            AdvisoryError::MissingGhost(1)
        );
        assert_eq!(
            parse_advisory(&json!([1, 2])).unwrap_err(),
            AdvisoryError::NotAnObject
        );
        assert_eq!(
            parse_advisory(&json!({ "targets": "nope" })).unwrap_err(),
            AdvisoryError::NotAnObject
        );

        let mut fractional = valid_payload();
        fractional["4"]["y"] = json!(1.5);
        assert_eq!(
            parse_advisory(&fractional).unwrap_err(),
            AdvisoryError::InvalidCoordinate { ghost: 4, axis: 'y' }
        );

        let mut textual = valid_payload();
        textual["1"]["x"] = json!("3");
        assert_eq!(
            parse_advisory(&textual).unwrap_err(),
            AdvisoryError::InvalidCoordinate { ghost: 1, axis: 'x' }
        );

        let mut huge = valid_payload();
        huge["2"]["x"] = json!(i64::from(i32::MAX) + 1);
        assert!(parse_advisory(&huge).is_err());
    }

    #[test]
    fn disabled_slot_is_offline_and_never_requests() {
        let mut slot = AdvisorySlot::new(None);
        let now = Instant::now();
        assert_eq!(slot.status(now), AdvisoryStatus::Offline);
        assert!(slot.poll_request(now, request).is_none());
        assert!(!slot.offer(
            AdvisoryReply {
                generation: 0,
                result: Ok(valid_payload()),
            },
            now
        ));
    }

    #[test]
    fn requests_are_throttled_by_interval() {
        let mut slot = enabled_slot();
        let start = Instant::now();
        assert_eq!(slot.status(start), AdvisoryStatus::Idle);
        let first = slot.poll_request(start, request).expect("first request");
        assert_eq!(first.generation, 1);
        assert_eq!(slot.status(start), AdvisoryStatus::Thinking);
        assert!(slot
            .poll_request(start + Duration::from_millis(50), request)
            .is_none());
        let second = slot
            .poll_request(start + Duration::from_millis(100), request)
            .expect("interval elapsed");
        assert_eq!(second.generation, 2);
    }

    #[test]
    fn stale_generation_is_dropped() {
        let mut slot = enabled_slot();
        let start = Instant::now();
        slot.poll_request(start, request);
        slot.poll_request(start + Duration::from_millis(100), request);
        let stale = AdvisoryReply {
            generation: 1,
            result: Ok(valid_payload()),
        };
        assert!(!slot.offer(stale, start + Duration::from_millis(110)));
        assert!(slot.current(start + Duration::from_millis(110)).is_none());

        let fresh = AdvisoryReply {
            generation: 2,
            result: Ok(valid_payload()),
        };
        assert!(slot.offer(fresh, start + Duration::from_millis(120)));
        assert_eq!(
            slot.status(start + Duration::from_millis(120)),
            AdvisoryStatus::Active
        );
    }

    #[test]
    fn accepted_override_expires_after_validity() {
        let mut slot = enabled_slot();
        let start = Instant::now();
        let req = slot.poll_request(start, request).expect("request");
        assert!(slot.offer(
            AdvisoryReply {
                generation: req.generation,
                result: Ok(valid_payload()),
            },
            start
        ));
        assert!(slot.current(start + Duration::from_millis(499)).is_some());
        assert!(slot.current(start + Duration::from_millis(500)).is_none());
        assert_eq!(
            slot.status(start + Duration::from_millis(600)),
            AdvisoryStatus::Idle
        );
    }

    #[test]
    fn rejected_reply_discards_held_override() {
        let mut slot = enabled_slot();
        let start = Instant::now();
        let first = slot.poll_request(start, request).expect("request");
        slot.offer(
            AdvisoryReply {
                generation: first.generation,
                result: Ok(valid_payload()),
            },
            start,
        );
        let later = start + Duration::from_millis(100);
        let second = slot.poll_request(later, request).expect("request");
        assert!(!slot.offer(
            AdvisoryReply {
                generation: second.generation,
                result: Ok(json!({"1": {"x": 0, "y": 0}})),
            },
            later
        ));
        assert!(slot.current(later).is_none());
        assert_eq!(slot.status(later), AdvisoryStatus::Error);

        let third = slot
            .poll_request(later + Duration::from_millis(100), request)
            .expect("request");
        assert!(!slot.offer(
            AdvisoryReply {
                generation: third.generation,
                result: Err(AdvisoryError::TimedOut),
            },
            later
        ));
        assert_eq!(slot.status(later), AdvisoryStatus::Error);
    }

    #[test]
    fn invalidate_orphans_in_flight_request() {
        let mut slot = enabled_slot();
        let start = Instant::now();
        let req = slot.poll_request(start, request).expect("request");
        slot.invalidate();
        assert!(!slot.offer(
            AdvisoryReply {
                generation: req.generation,
                result: Ok(valid_payload()),
            },
            start
        ));
        assert_eq!(slot.status(start), AdvisoryStatus::Idle);
    }
}
