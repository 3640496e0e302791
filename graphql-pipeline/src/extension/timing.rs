use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;

use super::Extension;
use super::Region;
use crate::execution_context::ExecutionContext;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::middleware::FieldInfo;
use crate::middleware::FieldMiddleware;
use crate::middleware::FieldResult;
use crate::middleware::Next;

/// Reports timings in the `tracing` response extension, following the
/// [Apollo Tracing](https://github.com/apollographql/apollo-tracing) v1 format.
///
/// Offsets and durations are in nanoseconds, relative to the start of the request.
#[derive(Debug, Default)]
pub struct ApolloTracing {
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    start: Option<Instant>,
    end: Option<Instant>,
    parsing: PhaseTiming,
    validation: PhaseTiming,
    resolvers: Mutex<Vec<ResolverReport>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PhaseTiming {
    start: Option<Instant>,
    end: Option<Instant>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TracingReport {
    version: u8,
    start_time: String,
    end_time: String,
    duration: u64,
    parsing: PhaseReport,
    validation: PhaseReport,
    execution: ExecutionReport,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct PhaseReport {
    start_offset: u64,
    duration: u64,
}

#[derive(Debug, Serialize)]
struct ExecutionReport {
    resolvers: Vec<ResolverReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolverReport {
    path: Path,
    parent_type: String,
    field_name: String,
    return_type: String,
    start_offset: u64,
    duration: u64,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ApolloTracing {
    fn offset(&self, instant: Instant) -> u64 {
        self.start
            .map(|start| nanos(instant.saturating_duration_since(start)))
            .unwrap_or_default()
    }

    fn phase(&self, timing: PhaseTiming) -> PhaseReport {
        match (timing.start, timing.end) {
            (Some(start), Some(end)) => PhaseReport {
                start_offset: self.offset(start),
                duration: nanos(end.saturating_duration_since(start)),
            },
            _ => PhaseReport::default(),
        }
    }

    fn phase_mut(&mut self, region: Region) -> Option<&mut PhaseTiming> {
        match region {
            Region::Request => None,
            Region::Parsing => Some(&mut self.parsing),
            Region::Validation => Some(&mut self.validation),
        }
    }
}

impl Extension for ApolloTracing {
    fn on_enter(&mut self, region: Region, _context: &mut ExecutionContext) {
        let now = Instant::now();
        match self.phase_mut(region) {
            Some(phase) => phase.start = Some(now),
            None => {
                self.start = Some(now);
                self.started_at = Some(Utc::now());
            }
        }
    }

    fn on_exit(&mut self, region: Region, _context: &mut ExecutionContext) {
        let now = Instant::now();
        match self.phase_mut(region) {
            Some(phase) => phase.end = Some(now),
            None => {
                self.end = Some(now);
                self.ended_at = Some(Utc::now());
            }
        }
    }

    fn results(&mut self, _context: &ExecutionContext) -> Object {
        let started_at = self.started_at.unwrap_or_else(Utc::now);
        let ended_at = self.ended_at.unwrap_or_else(Utc::now);
        let duration = match (self.start, self.end) {
            (Some(start), Some(end)) => nanos(end.saturating_duration_since(start)),
            _ => 0,
        };
        let report = TracingReport {
            version: 1,
            start_time: rfc3339(started_at),
            end_time: rfc3339(ended_at),
            duration,
            parsing: self.phase(self.parsing),
            validation: self.phase(self.validation),
            execution: ExecutionReport {
                resolvers: std::mem::take(&mut *self.resolvers.lock()),
            },
        };

        let mut results = Object::new();
        results.insert(
            "tracing",
            serde_json_bytes::to_value(report).unwrap_or_default(),
        );
        results
    }

    fn field_middleware(&self) -> Option<&dyn FieldMiddleware> {
        Some(self)
    }

    fn name(&self) -> &'static str {
        "apollo_tracing"
    }
}

impl FieldMiddleware for ApolloTracing {
    fn resolve<'a>(
        &'a self,
        info: &'a FieldInfo<'a>,
        next: Next<'a>,
    ) -> BoxFuture<'a, FieldResult> {
        async move {
            let started = Instant::now();
            let result = next.run(info).await;
            let report = ResolverReport {
                path: info.path.clone(),
                parent_type: info.parent_type.clone(),
                field_name: info.field_name.clone(),
                return_type: info.return_type.clone(),
                start_offset: self.offset(started),
                duration: nanos(started.elapsed()),
            };
            self.resolvers.lock().push(report);
            result
        }
        .boxed()
    }
}
