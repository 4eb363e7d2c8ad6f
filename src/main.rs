use op_lambda::api::api;
use op_lambda::graph::FunctionalGraph;
use op_lambda::graph::config::GraphConfig;
use op_lambda::tensor::DenseTensor;
use op_lambda::{CallArgs, GraphBuilder, PlaceholderKind, Value, default_registry};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let registry = default_registry();
    let mut builder = GraphBuilder::new(registry.clone());
    let values = builder.input(PlaceholderKind::Dense);
    let splits = builder.input(PlaceholderKind::Dense);

    let ragged = builder.call_class_method(
        &api().ragged_tensor,
        "from_row_splits",
        CallArgs::new().arg(&values).arg(&splits),
    )?;
    let ragged = ragged
        .as_placeholder()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("expected a placeholder"))?;
    let flat = builder.get_property(&ragged, "flat_values")?;
    let doubled = builder.call(&api().multiply, CallArgs::new().arg(flat).arg(2.0))?;
    let rescaled = builder.call_method(&ragged, "with_values", CallArgs::new().arg(doubled))?;
    let row_sums = builder.call(
        &api().reduce_sum,
        CallArgs::new().arg(rescaled).kwarg("axis", 1i64),
    )?;
    let graph = builder.build(&[row_sums])?;

    let text = graph.get_config()?.to_json()?;
    println!("{}", text);
    let restored = FunctionalGraph::from_config(&GraphConfig::from_json(&text)?, &registry)?;

    let feeds = vec![
        Value::from(DenseTensor::vector_f64(vec![1.0, 2.0, 3.0, 4.0, 5.0])),
        Value::from(DenseTensor::vector_i64(vec![0, 2, 2, 5])),
    ];
    for output in restored.execute(feeds)? {
        println!("{:?}", output);
    }
    Ok(())
}
