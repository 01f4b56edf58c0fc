//! Built-in global functions: a small set of host-provided operations exposed under
//! fixed names, registered into the evaluator's native-function table.

use crate::error::{ErrorKind, JestError, JestResult};
use crate::evaluator::Evaluator;
use crate::value::{Tri, Value};

pub fn register_default(evaluator: &mut Evaluator) {
    evaluator.register_native("print", print);
    evaluator.register_native("len", len);
    evaluator.register_native("type_of", type_of);
    evaluator.register_native("floor", floor);
    evaluator.register_native("ceil", ceil);
    evaluator.register_native("round", round);
    evaluator.register_native("random", random);
    evaluator.register_native("not", not);
}

fn print(_ev: &mut Evaluator, args: &[Value]) -> JestResult<Value> {
    let rendered = args.iter().map(Value::display_string).collect::<Vec<_>>().join(" ");
    println!("{rendered}");
    Ok(Value::Undefined)
}

fn len(_ev: &mut Evaluator, args: &[Value]) -> JestResult<Value> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::Number(s.chars().count() as f64)),
        Some(Value::Array(arr)) => Ok(Value::Number(arr.len() as f64)),
        _ => Err(JestError::new(ErrorKind::NotIndexable, "len() expects a string or array")),
    }
}

fn type_of(_ev: &mut Evaluator, args: &[Value]) -> JestResult<Value> {
    Ok(Value::string(args.first().map_or("Undefined", Value::kind_name)))
}

fn numeric_arg(args: &[Value]) -> JestResult<f64> {
    args.first()
        .and_then(|v| v.to_number().ok())
        .ok_or_else(|| JestError::new(ErrorKind::NotANumber, "expected a numeric argument"))
}

fn floor(_ev: &mut Evaluator, args: &[Value]) -> JestResult<Value> {
    Ok(Value::Number(numeric_arg(args)?.floor()))
}

fn ceil(_ev: &mut Evaluator, args: &[Value]) -> JestResult<Value> {
    Ok(Value::Number(numeric_arg(args)?.ceil()))
}

fn round(_ev: &mut Evaluator, args: &[Value]) -> JestResult<Value> {
    Ok(Value::Number(numeric_arg(args)?.round()))
}

fn random(ev: &mut Evaluator, _args: &[Value]) -> JestResult<Value> {
    Ok(Value::Number(ev.next_random()))
}

/// Logical not over the tri-valued booleans: `maybe` negates to itself, since "not
/// sure" stays "not sure".
fn not(_ev: &mut Evaluator, args: &[Value]) -> JestResult<Value> {
    let result = match args.first() {
        Some(Value::Boolean(Tri::False)) => Tri::True,
        Some(Value::Boolean(Tri::True)) => Tri::False,
        Some(Value::Boolean(Tri::Maybe)) => Tri::Maybe,
        Some(other) => {
            if other.is_truthy() {
                Tri::False
            } else {
                Tri::True
            }
        }
        None => Tri::True,
    };
    Ok(Value::Boolean(result))
}
