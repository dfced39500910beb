use std::cell::RefCell;
use std::future::Future;
use std::time::Instant;

use sqlx::SqlitePool;

use crate::store;

/// Call site captured by the `track!` macros at expansion time.
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    pub file: &'static str,
    pub function: &'static str,
    pub line: u32,
}

/// A checkpoint buffered in-memory until the recorder flushes it.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub sequence: i64,
    pub file: String,
    pub function: String,
    pub line: i64,
    pub elapsed_seconds: Option<f64>,
    pub message: Option<String>,
}

/// Ordered checkpoint log for one in-flight request. Owned by that request's
/// task through a task-local scope, so the buffered push path has exactly one
/// writer and needs no locking.
#[derive(Debug)]
pub struct TraceStack {
    timers_enabled: bool,
    entries: Vec<PendingEntry>,
    last_push: Option<Instant>,
}

impl TraceStack {
    pub fn new(timers_enabled: bool) -> Self {
        Self {
            timers_enabled,
            entries: Vec::new(),
            last_push: None,
        }
    }

    /// Append a checkpoint. Sequence numbering starts at 1 and is strictly
    /// increasing within the stack. `elapsed_seconds` is the time since the
    /// previous push, None for the first push or when timers are off.
    pub fn push(&mut self, site: CallSite, message: Option<String>) -> bool {
        let now = self.timers_enabled.then(Instant::now);
        let elapsed_seconds = match (now, self.last_push) {
            (Some(now), Some(prev)) => Some((now - prev).as_secs_f64()),
            _ => None,
        };

        self.entries.push(PendingEntry {
            sequence: self.entries.len() as i64 + 1,
            file: site.file.to_string(),
            function: site.function.to_string(),
            line: site.line as i64,
            elapsed_seconds,
            message,
        });
        self.last_push = now;
        true
    }

    /// Take all entries in sequence order, leaving the stack empty. Called
    /// once per request, after the response is produced.
    pub fn drain(&mut self) -> Vec<PendingEntry> {
        self.last_push = None;
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct RequestScope {
    request_id: String,
    stack: RefCell<TraceStack>,
}

tokio::task_local! {
    static SCOPE: RequestScope;
}

/// Run `fut` with a fresh trace stack installed for this task, returning its
/// output together with the drained entries.
pub(crate) async fn with_scope<F>(
    request_id: String,
    timers_enabled: bool,
    fut: F,
) -> (F::Output, Vec<PendingEntry>)
where
    F: Future,
{
    SCOPE
        .scope(
            RequestScope {
                request_id,
                stack: RefCell::new(TraceStack::new(timers_enabled)),
            },
            async {
                let out = fut.await;
                let drained = SCOPE.with(|s| s.stack.borrow_mut().drain());
                (out, drained)
            },
        )
        .await
}

/// Push onto the current request's stack. Returns false when there is no
/// recorder scope on this task, which is also how a globally disabled
/// recorder presents itself.
pub fn push(site: CallSite, message: Option<String>) -> bool {
    SCOPE
        .try_with(|s| s.stack.borrow_mut().push(site, message))
        .unwrap_or(false)
}

/// The request id of the current recorder scope, if any. Capture this before
/// spawning deferred work so the work can annotate the request with
/// `track_deferred!`.
pub fn current_request_id() -> Option<String> {
    SCOPE.try_with(|s| s.request_id.clone()).ok()
}

/// Persist one checkpoint for a request that is no longer in flight. The
/// sequence number is allocated inside a single INSERT..SELECT, so concurrent
/// writers against the same request_id never collide.
pub async fn push_deferred(
    pool: &SqlitePool,
    request_id: &str,
    site: CallSite,
    message: Option<String>,
) -> Result<(), sqlx::Error> {
    store::append_deferred_entry(pool, request_id, site, message.as_deref()).await
}

/// Strip the trailing `::f` and any async `::{{closure}}` frames from a
/// `type_name` so the recorded function is the enclosing fn path.
pub fn clean_function_name(raw: &'static str) -> &'static str {
    let mut name = raw.strip_suffix("::f").unwrap_or(raw);
    while let Some(stripped) = name.strip_suffix("::{{closure}}") {
        name = stripped;
    }
    name
}

/// Append a checkpoint to the current request's trace stack, capturing the
/// call site automatically.
///
/// ```ignore
/// track!();
/// track!("loaded profile");
/// ```
///
/// Returns false when recording is disabled or the caller is outside a
/// recorded request.
#[macro_export]
macro_rules! track {
    () => {
        $crate::track!(@push ::core::option::Option::None)
    };
    ($msg:expr) => {
        $crate::track!(@push ::core::option::Option::Some(::std::string::String::from($msg)))
    };
    (@push $msg:expr) => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::core::any::type_name::<T>()
        }
        $crate::trace::push(
            $crate::trace::CallSite {
                file: ::core::file!(),
                function: $crate::trace::clean_function_name(type_name_of(f)),
                line: ::core::line!(),
            },
            $msg,
        )
    }};
}

/// Append a checkpoint for an explicit request id from outside its request
/// context, e.g. a queued job. Persists immediately; expands to a future.
///
/// ```ignore
/// track_deferred!(&pool, &request_id, "job finished").await?;
/// ```
#[macro_export]
macro_rules! track_deferred {
    ($pool:expr, $request_id:expr) => {
        $crate::track_deferred!(@go $pool, $request_id, ::core::option::Option::None)
    };
    ($pool:expr, $request_id:expr, $msg:expr) => {
        $crate::track_deferred!(@go $pool, $request_id, ::core::option::Option::Some(::std::string::String::from($msg)))
    };
    (@go $pool:expr, $request_id:expr, $msg:expr) => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::core::any::type_name::<T>()
        }
        $crate::trace::push_deferred(
            $pool,
            $request_id,
            $crate::trace::CallSite {
                file: ::core::file!(),
                function: $crate::trace::clean_function_name(type_name_of(f)),
                line: ::core::line!(),
            },
            $msg,
        )
    }};
}
