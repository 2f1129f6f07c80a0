//! Execution host: runs one job in a fresh engine context.

use boa_engine::{
    builtins::promise::{OperationType, PromiseState},
    context::HostHooks,
    object::builtins::JsPromise,
    Context, JsData, JsError, JsObject, JsResult, JsValue, Script, Source,
};
use boa_gc::{Finalize, Trace};
use common::{FaultOrigin, Job, Language, OutputRecord, SandboxError, SandboxResult, StructuredValue, ValueKind};
use std::rc::Rc;

use crate::config::SandboxConfig;
use crate::console::{register_console, ConsoleState};
use crate::formatter::ValueFormatter;
use crate::location::{Failure, FailurePhase, LocationResolver};
use crate::sink::RecordSink;

/// Lifecycle of an execution host. `Completed` and `Faulted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Running,
    Completed,
    Faulted,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Faulted)
    }
}

/// Promises rejected with no handler attached, in rejection order.
#[derive(Default, Trace, Finalize, JsData)]
struct UnhandledRejections {
    promises: Vec<JsObject>,
}

/// Host hooks that keep [`UnhandledRejections`] in the realm up to date.
struct RejectionTracker;

impl HostHooks for RejectionTracker {
    fn promise_rejection_tracker(&self, promise: &JsObject, operation: OperationType, context: &mut Context) {
        let mut host_defined = context.realm().host_defined_mut();
        let Some(tracked) = host_defined.get_mut::<UnhandledRejections>() else {
            return;
        };
        match operation {
            OperationType::Reject => tracked.promises.push(promise.clone()),
            OperationType::Handle => tracked.promises.retain(|p| !JsObject::equals(p, promise)),
        }
    }
}

static REJECTION_TRACKER: RejectionTracker = RejectionTracker;

/// Runs a single job.
///
/// A host is good for exactly one run: the engine context, console state and
/// any queued jobs are created inside [`ExecutionHost::run`] and dropped with
/// it.
pub struct ExecutionHost {
    config: SandboxConfig,
    sink: Rc<dyn RecordSink>,
    state: ExecutionState,
}

impl ExecutionHost {
    /// Create an idle host that reports to `sink`.
    pub fn new(config: SandboxConfig, sink: Rc<dyn RecordSink>) -> Self {
        Self {
            config,
            sink,
            state: ExecutionState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Run a job to completion.
    ///
    /// Failures of the submitted code are not errors here: they end in
    /// `Faulted` after one error record has been emitted. `Err` is only
    /// returned when the host was already used.
    pub fn run(&mut self, job: &Job) -> SandboxResult<ExecutionState> {
        if self.state != ExecutionState::Idle {
            return Err(SandboxError::invalid_state(format!(
                "execution host already {:?}",
                self.state
            )));
        }

        self.state = ExecutionState::Running;
        tracing::debug!("Running {} job ({} bytes)", job.language, job.source.len());

        self.state = match job.language {
            Language::Javascript => self.run_script(&job.source),
        };

        tracing::debug!("Execution finished: {:?}", self.state);
        Ok(self.state)
    }

    fn run_script(&self, source: &str) -> ExecutionState {
        let formatter = ValueFormatter::new(self.config.max_depth)
            .with_preview_len(self.config.preview_len)
            .with_source(source);
        let console = Rc::new(ConsoleState::new(formatter, self.sink.clone()));

        let mut context = match self.prepare_context(console) {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!("Host setup failed: {}", err);
                let failure = Failure::runtime("HostSetupError", err.to_string(), None);
                return self.fault(FaultOrigin::HostSetup, &failure, None);
            }
        };

        // Compile first so that syntax errors never run any of the code.
        let script = match Script::parse(Source::from_bytes(source.as_bytes()), None, &mut context) {
            Ok(script) => script,
            Err(err) => {
                let failure = Failure::from_js_error(FailurePhase::Parse, &err, &mut context);
                return self.fault(FaultOrigin::UserCode, &failure, Some(source));
            }
        };

        if let Err(err) = script.evaluate(&mut context) {
            let failure = Failure::from_js_error(FailurePhase::Runtime, &err, &mut context);
            return self.fault(FaultOrigin::UserCode, &failure, Some(source));
        }

        context.run_jobs();

        match take_unhandled_rejection(&mut context) {
            Some(reason) => {
                let failure = Failure::from_js_error(FailurePhase::Runtime, &JsError::from_opaque(reason), &mut context);
                self.fault(FaultOrigin::UserCode, &failure, Some(source))
            }
            None => ExecutionState::Completed,
        }
    }

    /// Fresh context with runtime limits applied and the console injected.
    fn prepare_context(&self, console: Rc<ConsoleState>) -> JsResult<Context> {
        let mut context = Context::builder().host_hooks(&REJECTION_TRACKER).build()?;
        context
            .realm()
            .host_defined_mut()
            .insert_default::<UnhandledRejections>();

        if let Some(limit) = self.config.effective_loop_iteration_limit() {
            context.runtime_limits_mut().set_loop_iteration_limit(limit);
        }
        if let Some(limit) = self.config.recursion_limit {
            context.runtime_limits_mut().set_recursion_limit(limit);
        }

        register_console(&mut context, console)?;
        Ok(context)
    }

    /// Emit the single error record of a faulted run.
    fn fault(&self, origin: FaultOrigin, failure: &Failure, source: Option<&str>) -> ExecutionState {
        tracing::debug!("{:?} failure: {}", failure.phase, failure.summary());

        let location = source
            .map(|source| LocationResolver::new().resolve(failure, source))
            .filter(|location| location.has_location);

        let error = StructuredValue::new(ValueKind::Error, failure.summary()).with_stack(failure.stack.clone());
        self.sink.emit(OutputRecord::fault(origin, error, location));
        ExecutionState::Faulted
    }
}

/// Reason of the first promise still rejected without a handler.
fn take_unhandled_rejection(context: &mut Context) -> Option<JsValue> {
    let promises = context
        .realm()
        .host_defined_mut()
        .get_mut::<UnhandledRejections>()
        .map(|tracked| std::mem::take(&mut tracked.promises))
        .unwrap_or_default();

    if promises.len() > 1 {
        tracing::debug!("{} unhandled rejections, reporting the first", promises.len());
    }

    promises.into_iter().find_map(|promise| match JsPromise::from_object(promise).ok()?.state() {
        PromiseState::Rejected(reason) => Some(reason),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecSink;
    use common::RecordType;

    fn execute(source: &str) -> (ExecutionState, Vec<OutputRecord>) {
        execute_with(SandboxConfig::default(), source)
    }

    fn execute_with(config: SandboxConfig, source: &str) -> (ExecutionState, Vec<OutputRecord>) {
        let sink = Rc::new(VecSink::new());
        let mut host = ExecutionHost::new(config, sink.clone());
        let state = host.run(&Job::new(source)).unwrap();
        (state, sink.take())
    }

    #[test]
    fn test_completed_run() {
        let (state, records) = execute("const x = 1 + 2; console.log(x);");
        assert_eq!(state, ExecutionState::Completed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_text(), "3");
    }

    #[test]
    fn test_silent_run_emits_nothing() {
        let (state, records) = execute("let unused = [1, 2, 3].map(n => n * 2);");
        assert_eq!(state, ExecutionState::Completed);
        assert!(records.is_empty());
    }

    #[test]
    fn test_runtime_failure_follows_earlier_logs() {
        let (state, records) = execute("console.log('before'); console.log(2);\nnotDefined();\nconsole.log('after');");

        assert_eq!(state, ExecutionState::Faulted);
        let types: Vec<_> = records.iter().map(|r| r.record_type).collect();
        assert_eq!(types, vec![RecordType::Log, RecordType::Log, RecordType::Error]);

        let error = records.last().unwrap();
        assert_eq!(error.fault, Some(FaultOrigin::UserCode));
        assert_eq!(records.iter().filter(|r| r.is_error()).count(), 1);
        assert!(error.display_text().starts_with("ReferenceError"), "{}", error.display_text());
    }

    #[test]
    fn test_syntax_error_location() {
        let source = "console.log('never');\nlet ok = 1;\nlet broken = ;\nlet fine = 2;\nconsole.log(fine);";
        let (state, records) = execute(source);

        assert_eq!(state, ExecutionState::Faulted);
        assert_eq!(records.len(), 1);
        let error = &records[0];
        assert!(error.display_text().starts_with("SyntaxError"));

        let location = error.location.as_ref().unwrap();
        assert!(location.has_location);
        assert_eq!(location.line_number, Some(3));
        assert_eq!(location.context_lines.len(), 5);
        assert_eq!(location.context_lines.iter().filter(|l| l.is_error_line).count(), 1);
    }

    #[test]
    fn test_thrown_error_object() {
        let (state, records) = execute("throw new RangeError('too far');");
        assert_eq!(state, ExecutionState::Faulted);
        assert_eq!(records[0].display_text(), "RangeError: too far");
    }

    #[test]
    fn test_thrown_primitive() {
        let (_, records) = execute("throw 'boom';");
        assert_eq!(records[0].display_text(), "Uncaught: boom");
        assert_eq!(records[0].content.values()[0].kind, ValueKind::Error);
    }

    #[test]
    fn test_caught_errors_do_not_fault() {
        let (state, records) = execute("try { null.x; } catch (e) { console.error(e); }");
        assert_eq!(state, ExecutionState::Completed);
        assert_eq!(records.len(), 1);
        assert!(records[0].fault.is_none());
        assert!(records[0].display_text().starts_with("TypeError"));
    }

    #[test]
    fn test_promise_jobs_are_drained() {
        let (_, records) = execute("Promise.resolve(7).then(v => console.log('resolved', v));");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_text(), "\"resolved\" 7");
    }

    #[test]
    fn test_async_throw_faults() {
        let (state, records) = execute("console.log('start');\n(async () => { await null; notDefined(); })();");

        assert_eq!(state, ExecutionState::Faulted);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display_text(), "\"start\"");
        assert_eq!(records[1].fault, Some(FaultOrigin::UserCode));
        assert!(records[1].display_text().starts_with("ReferenceError"), "{}", records[1].display_text());
    }

    #[test]
    fn test_unhandled_rejection_of_primitive() {
        let (state, records) = execute("Promise.reject('nope');");
        assert_eq!(state, ExecutionState::Faulted);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_text(), "Uncaught: nope");
    }

    #[test]
    fn test_handled_rejection_completes() {
        let (state, records) = execute(
            "const p = Promise.reject(new Error('x'));\np.catch(e => console.log('caught', e.message));",
        );
        assert_eq!(state, ExecutionState::Completed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_text(), "\"caught\" \"x\"");
    }

    #[test]
    fn test_function_preview_uses_job_source() {
        let (_, records) = execute("function greet(name) { return 'hi ' + name; }\nconsole.log(greet);");
        let value = &records[0].content.values()[0];
        assert_eq!(value.display, "ƒ greet()");
        assert_eq!(value.preview.as_deref(), Some("function greet(name) { return 'hi ' + name; }\nc..."));
    }

    #[test]
    fn test_loop_limit_faults() {
        let config = SandboxConfig::default().with_loop_iteration_limit(1_000);
        let (state, records) = execute_with(config, "while (true) {}");
        assert_eq!(state, ExecutionState::Faulted);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_fault());
    }

    #[test]
    fn test_depth_limit_from_config() {
        let config = SandboxConfig::default().with_max_depth(1);
        let (_, records) = execute_with(config, "console.log({ a: { b: { c: 1 } } });");
        assert_eq!(records[0].display_text(), "{a: {b: [Max Depth Reached]}}");
    }

    #[test]
    fn test_host_is_single_use() {
        let sink = Rc::new(VecSink::new());
        let mut host = ExecutionHost::new(SandboxConfig::default(), sink);
        assert_eq!(host.state(), ExecutionState::Idle);

        host.run(&Job::new("1")).unwrap();
        assert!(host.state().is_terminal());
        assert!(matches!(host.run(&Job::new("1")), Err(SandboxError::InvalidState(_))));
    }

    #[test]
    fn test_hosts_do_not_share_console_state() {
        let (_, first) = execute("console.time('x'); console.count('n');");
        let (_, second) = execute("console.timeEnd('x'); console.count('n');");

        assert_eq!(first.len(), 1);
        assert_eq!(second[0].record_type, RecordType::Warn);
        assert_eq!(second[0].display_text(), "Timer 'x' does not exist");
        assert_eq!(second[1].display_text(), "n: 1");
    }
}
