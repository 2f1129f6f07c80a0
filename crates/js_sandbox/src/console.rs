//! Console API implementation.
//!
//! Every console call turns into exactly one [`OutputRecord`] pushed to the
//! execution's sink before the call returns. Timer and counter state lives in
//! a [`ConsoleState`] owned by one execution, so nothing leaks between runs.

use boa_engine::{
    Context, JsArgs, JsResult, JsString, JsValue, NativeFunction,
    js_string,
    object::ObjectInitializer,
    property::Attribute,
};
use boa_gc::{Finalize, Trace};
use common::{OutputRecord, RecordType, StructuredValue, TableRow, ValueKind};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use crate::formatter::{self, ValueFormatter};
use crate::sink::RecordSink;

/// Label used when a timer or counter call passes none.
pub const DEFAULT_LABEL: &str = "default";

/// Per-execution console state.
pub struct ConsoleState {
    formatter: ValueFormatter,
    sink: Rc<dyn RecordSink>,
    timers: RefCell<HashMap<String, Instant>>,
    counters: RefCell<HashMap<String, u64>>,
}

impl ConsoleState {
    pub fn new(formatter: ValueFormatter, sink: Rc<dyn RecordSink>) -> Self {
        Self {
            formatter,
            sink,
            timers: RefCell::new(HashMap::new()),
            counters: RefCell::new(HashMap::new()),
        }
    }

    /// Number of running timers.
    pub fn active_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Current value of a counter, if it exists.
    pub fn counter(&self, label: &str) -> Option<u64> {
        self.counters.borrow().get(label).copied()
    }

    fn emit(&self, record: OutputRecord) {
        self.sink.emit(record);
    }

    fn start_timer(&self, label: String) {
        self.timers.borrow_mut().insert(label, Instant::now());
    }

    /// Stop a timer, returning the elapsed milliseconds.
    fn stop_timer(&self, label: &str) -> Option<f64> {
        self.timers
            .borrow_mut()
            .remove(label)
            .map(|start| start.elapsed().as_secs_f64() * 1000.0)
    }

    fn increment(&self, label: &str) -> u64 {
        let mut counters = self.counters.borrow_mut();
        let count = counters.entry(label.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset(&self, label: &str) {
        self.counters.borrow_mut().remove(label);
    }
}

/// Closure captures for the native console functions.
#[derive(Trace, Finalize)]
struct ConsoleCapture {
    #[unsafe_ignore_trace]
    state: Rc<ConsoleState>,
}

type ConsoleMethod = fn(&ConsoleState, &[JsValue], &mut Context) -> JsResult<()>;

const METHODS: &[(&str, ConsoleMethod)] = &[
    ("log", console_log),
    ("info", console_info),
    ("warn", console_warn),
    ("error", console_error),
    ("table", console_table),
    ("time", console_time),
    ("timeEnd", console_time_end),
    ("count", console_count),
    ("countReset", console_count_reset),
];

/// Build the console object for one execution.
pub fn build_console(context: &mut Context, state: Rc<ConsoleState>) -> JsValue {
    let mut console = ObjectInitializer::new(context);

    for &(name, method) in METHODS {
        let function = NativeFunction::from_copy_closure_with_captures(
            move |_this: &JsValue, args: &[JsValue], capture: &ConsoleCapture, ctx: &mut Context| {
                method(&capture.state, args, ctx)?;
                Ok(JsValue::undefined())
            },
            ConsoleCapture {
                state: state.clone(),
            },
        );
        console.function(function, JsString::from(name), 0);
    }

    console.build().into()
}

/// Register the console API on the global object.
pub fn register_console(context: &mut Context, state: Rc<ConsoleState>) -> JsResult<()> {
    let console = build_console(context, state);
    context.register_global_property(js_string!("console"), console, Attribute::all())
}

/// Resolve the optional label argument of timer and counter calls.
fn label_arg(args: &[JsValue], context: &mut Context) -> JsResult<String> {
    let label = args.get_or_undefined(0);
    if label.is_undefined() {
        return Ok(DEFAULT_LABEL.to_string());
    }
    Ok(label.to_string(context)?.to_std_string_escaped())
}

fn emit_values(state: &ConsoleState, record_type: RecordType, args: &[JsValue], context: &mut Context) {
    let values = state.formatter.format_args(args, context);
    state.emit(OutputRecord::new(record_type, values).with_count(args.len() as u64));
}

/// console.log()
fn console_log(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    emit_values(state, RecordType::Log, args, context);
    Ok(())
}

/// console.info()
fn console_info(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    emit_values(state, RecordType::Info, args, context);
    Ok(())
}

/// console.warn()
fn console_warn(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    emit_values(state, RecordType::Warn, args, context);
    Ok(())
}

/// console.error()
///
/// Error objects are unwrapped at the top level even when they would
/// otherwise sit past the formatter's depth limit.
fn console_error(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    let values = args
        .iter()
        .map(|arg| match arg.as_object() {
            Some(obj) if formatter::is_error(arg, context) => formatter::format_error(obj, context),
            _ => state.formatter.format(arg, context),
        })
        .collect();
    state.emit(OutputRecord::new(RecordType::Error, values).with_count(args.len() as u64));
    Ok(())
}

/// console.table()
fn console_table(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    let data = args.get_or_undefined(0);
    let rows = table_rows(&state.formatter, data, context);
    state.emit(OutputRecord::table(rows));
    Ok(())
}

/// Rows for `console.table`. Unreadable elements and properties become
/// `[Getter Error]` cells instead of failing the call.
fn table_rows(fmt: &ValueFormatter, data: &JsValue, context: &mut Context) -> Vec<TableRow> {
    let Some(obj) = data.as_object().filter(|obj| !obj.is_callable()) else {
        return vec![value_row(fmt.format_at(data, 1, context))];
    };

    if obj.is_array() {
        let length = formatter::array_length(obj, context);
        return (0..length)
            .map(|index| {
                let mut row = TableRow::new();
                row.insert(
                    "index".to_string(),
                    StructuredValue::new(ValueKind::Number, index.to_string()).with_raw(index.into()),
                );
                match obj.get(index, context) {
                    Ok(item) => spread_item(fmt, &item, &mut row, context),
                    Err(_) => {
                        row.insert("value".to_string(), StructuredValue::getter_error());
                    }
                }
                row
            })
            .collect();
    }

    let Ok(keys) = formatter::own_enumerable_keys(obj, context) else {
        return vec![value_row(StructuredValue::getter_error())];
    };

    keys.into_iter()
        .map(|key| {
            let value = match obj.get(JsString::from(key.as_str()), context) {
                Ok(value) => fmt.format_at(&value, 1, context),
                Err(_) => StructuredValue::getter_error(),
            };
            let mut row = TableRow::new();
            row.insert("key".to_string(), StructuredValue::text(key));
            row.insert("value".to_string(), value);
            row
        })
        .collect()
}

/// Object elements spread their own properties into the row; anything else
/// lands in a `value` column.
fn spread_item(fmt: &ValueFormatter, item: &JsValue, row: &mut TableRow, context: &mut Context) {
    let Some(item_obj) = item.as_object().filter(|item| !item.is_callable()) else {
        row.insert("value".to_string(), fmt.format_at(item, 1, context));
        return;
    };

    match formatter::own_enumerable_keys(item_obj, context) {
        Ok(keys) => {
            for key in keys {
                let cell = match item_obj.get(JsString::from(key.as_str()), context) {
                    Ok(cell) => fmt.format_at(&cell, 1, context),
                    Err(_) => StructuredValue::getter_error(),
                };
                row.insert(key, cell);
            }
        }
        Err(_) => {
            row.insert("value".to_string(), StructuredValue::getter_error());
        }
    }
}

fn value_row(value: StructuredValue) -> TableRow {
    let mut row = TableRow::new();
    row.insert("value".to_string(), value);
    row
}

/// console.time()
fn console_time(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    let label = label_arg(args, context)?;
    state.start_timer(label);
    Ok(())
}

/// console.timeEnd()
fn console_time_end(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    let label = label_arg(args, context)?;

    let record = match state.stop_timer(&label) {
        Some(elapsed) => {
            let message = format!("{}: {:.3}ms", label, elapsed);
            let raw = serde_json::Number::from_f64(elapsed)
                .map(serde_json::Value::Number)
                .unwrap_or_default();
            OutputRecord::new(RecordType::Time, vec![StructuredValue::text(message).with_raw(raw)])
                .with_label(label)
        }
        None => OutputRecord::text(RecordType::Warn, format!("Timer '{}' does not exist", label)),
    };

    state.emit(record);
    Ok(())
}

/// console.count()
fn console_count(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    let label = label_arg(args, context)?;
    let count = state.increment(&label);

    let value = StructuredValue::text(format!("{}: {}", label, count)).with_raw(count.into());
    state.emit(
        OutputRecord::new(RecordType::Count, vec![value])
            .with_label(label)
            .with_count(count),
    );
    Ok(())
}

/// console.countReset()
fn console_count_reset(state: &ConsoleState, args: &[JsValue], context: &mut Context) -> JsResult<()> {
    let label = label_arg(args, context)?;
    state.reset(&label);
    state.emit(OutputRecord::text(RecordType::Info, format!("Counter '{}' reset", label)));
    Ok(())
}
