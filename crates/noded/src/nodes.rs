//! Sample nodes exercising each kind of signature the host supports.

use std::time::Duration;

use noderun::AsyncNode;
use noderun::Call;
use noderun::NodeBuilder;
use noderun::Registry;
use noderun::Ty;
use noderun::registry;
use noderun::value::Vec3;
use serde_json::Value;
use serde_json::json;

fn simple_node(call: &mut Call) -> anyhow::Result<Value> {
    let a: i64 = call.arg(0)?;
    let b: i64 = call.arg(1)?;
    Ok(json!(a + b))
}

fn node_with_array_type(call: &mut Call) -> anyhow::Result<Value> {
    let a: Vec<i64> = call.arg(0)?;
    Ok(json!(a.len()))
}

fn node_with_multiple_outputs(call: &mut Call) -> anyhow::Result<Value> {
    let a: i64 = call.arg(0)?;
    let b: i64 = call.arg(1)?;
    Ok(json!([a + b, a - b]))
}

fn node_with_complex_types(call: &mut Call) -> anyhow::Result<Value> {
    let a: Vec3 = call.arg(0)?;
    let b: Vec3 = call.arg(1)?;
    let sum = Vec3 {
        x: a.x + b.x,
        y: a.y + b.y,
        z: a.z + b.z,
    };
    Ok(serde_json::to_value(sum)?)
}

fn node_with_feedback(call: &mut Call) -> anyhow::Result<Value> {
    let message: String = call.arg(0)?;
    let ctx = call.context()?;
    ctx.debug_log("My message is:");
    ctx.debug_log(message);
    Ok(Value::Null)
}

fn node_with_state(call: &mut Call) -> anyhow::Result<Value> {
    let count = call.context()?.get_or_insert_with(|| 0i64)?;
    *count += 1;
    Ok(json!(*count))
}

/// Adds after a short delay.
struct SlowAdd;

#[async_trait::async_trait]
impl AsyncNode for SlowAdd {
    async fn call(&self, call: &mut Call) -> anyhow::Result<Value> {
        let a: i64 = call.arg(0)?;
        let b: i64 = call.arg(1)?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(json!(a + b))
    }
}

/// Registers every sample node.
pub fn register_all(registry: &mut Registry) -> registry::Result<()> {
    registry.register_node(
        NodeBuilder::sync(simple_node)
            .description("Example node that adds two numbers")
            .input::<i64>("a")
            .input::<i64>("b")
            .output::<i64>(),
    )?;

    registry.register_node(
        NodeBuilder::sync(simple_node)
            .name("simple_node_with_defaults")
            .description("Example node that adds two numbers (with default values)")
            .input_with_default::<i64>("a", 10)
            .input_with_default::<i64>("b", 10)
            .output::<i64>(),
    )?;

    registry.register_node(
        NodeBuilder::sync(node_with_array_type)
            .description("Example node that calculates length of an array")
            .input::<Vec<i64>>("a")
            .output::<u64>(),
    )?;

    registry.register_node(
        NodeBuilder::sync(node_with_multiple_outputs)
            .description("Example node that returns two numbers")
            .input::<i64>("a")
            .input::<i64>("b")
            .returns(Ty::of::<(i64, i64)>()),
    )?;

    registry.register_node(
        NodeBuilder::sync(node_with_complex_types)
            .description("Example node that adds two vectors")
            .input::<Vec3>("a")
            .input::<Vec3>("b")
            .output::<Vec3>(),
    )?;

    registry.register_node(
        NodeBuilder::asynchronous(SlowAdd)
            .name("async_node")
            .description("Example async node")
            .input::<i64>("a")
            .input::<i64>("b")
            .output::<i64>(),
    )?;

    registry.register_node(
        NodeBuilder::sync(node_with_feedback)
            .description("Example node that logs a message")
            .context()
            .input::<String>("message"),
    )?;

    registry.register_node(
        NodeBuilder::sync(node_with_state)
            .description("Example node that increments a number on each call")
            .context()
            .output::<i64>(),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all() {
        let mut registry = Registry::with_namespace("test");
        register_all(&mut registry).unwrap();
        assert_eq!(registry.len(), 8);

        let add = registry.lookup("test/simple_node").unwrap();
        assert_eq!(add.spec().label, "Simple Node");

        let defaults = registry.lookup("test/simple_node_with_defaults").unwrap();
        assert_eq!(defaults.spec().inputs[1].default, Some(json!(10)));

        let state = registry.lookup("test/node_with_state").unwrap();
        assert!(state.first_arg_is_context());
    }

    #[test]
    fn test_multiple_outputs_returns_pair() {
        let mut call = Call::new(vec![json!(5), json!(3)], None);
        assert_eq!(node_with_multiple_outputs(&mut call).unwrap(), json!([8, 2]));
    }
}
