use super::{as_ragged, assert_close, placeholder, ragged_f64};
use op_lambda::api::api;
use op_lambda::dispatch::DispatchRegistry;
use op_lambda::graph::{GraphBuilder, GraphError};
use op_lambda::placeholder::{PlaceholderClass, PlaceholderKind};
use op_lambda::tensor::{DenseTensor, SparseTensor, Tensor};
use op_lambda::value::{CallArgs, Value};
use std::sync::Arc;

pub fn test_with_values_end_to_end(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let rt = builder.input(PlaceholderKind::ragged(1));
    let values = builder.get_property(&rt, "values").unwrap();
    assert_eq!(placeholder(&values).kind(), PlaceholderKind::Dense);
    let doubled = builder
        .call(&api().multiply, CallArgs::new().arg(values).arg(2.0))
        .unwrap();
    let out = placeholder(
        &builder
            .call_method(&rt, "with_values", CallArgs::new().arg(doubled))
            .unwrap(),
    );
    assert_eq!(out.kind(), PlaceholderKind::ragged(1));
    let producer = out.producer().unwrap();
    assert_eq!(producer.class_name, "InstanceMethod");
    assert!(producer.layer_name.contains("with_values"));

    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph
        .execute(vec![ragged_f64(&[1.0, 2.0, 3.0], &[0, 2, 2, 3])])
        .unwrap();
    let result = as_ragged(&outputs[0]);
    assert_eq!(result.row_splits(), &[0, 2, 2, 3]);
    assert_close(&result.flat_values().clone().into(), &[2.0, 4.0, 6.0]);
}

pub fn test_property_names_are_disambiguated(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let rt = builder.input(PlaceholderKind::ragged(2));
    let names: Vec<String> = ["values", "values", "flat_values"]
        .into_iter()
        .map(|member| {
            let out = builder.get_property(&rt, member).unwrap();
            placeholder(&out).producer().unwrap().layer_name.clone()
        })
        .collect();
    assert_eq!(names, ["input.values", "input.values_1", "input.flat_values"]);

    let inner = builder.get_property(&rt, "values").unwrap();
    assert_eq!(placeholder(&inner).kind(), PlaceholderKind::ragged(1));
}

pub fn test_excluded_member_is_not_delegated(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let rt = builder.input(PlaceholderKind::ragged(1));
    let err = builder.get_property(&rt, "uniform_row_length").unwrap_err();
    assert!(matches!(
        err,
        GraphError::NotDelegated { class: PlaceholderClass::Ragged, ref member } if member == "uniform_row_length"
    ));
    let err = builder
        .call_method(&rt, "values", CallArgs::new())
        .unwrap_err();
    assert!(matches!(err, GraphError::NotDelegated { .. }));
    assert!(builder.nodes().is_empty());
}

pub fn test_members_follow_placeholder_class(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let dense = builder.input(PlaceholderKind::Dense);
    assert!(matches!(
        builder.get_property(&dense, "values"),
        Err(GraphError::NotDelegated { .. })
    ));
    let sparse = builder.input(PlaceholderKind::Sparse);
    assert!(builder.get_property(&sparse, "indices").is_ok());
    assert!(matches!(
        builder.get_property(&sparse, "row_splits"),
        Err(GraphError::NotDelegated { .. })
    ));
}

pub fn test_merge_dims_flattens(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let rt = builder.input(PlaceholderKind::ragged(1));
    let out = placeholder(
        &builder
            .call_method(&rt, "merge_dims", CallArgs::new().arg(0i64).arg(1i64))
            .unwrap(),
    );
    assert_eq!(out.kind(), PlaceholderKind::Dense);

    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph
        .execute(vec![ragged_f64(&[1.0, 2.0, 3.0], &[0, 2, 3])])
        .unwrap();
    assert_close(&outputs[0], &[1.0, 2.0, 3.0]);
}

pub fn test_sparse_values_roundtrip(registry: Arc<DispatchRegistry>) {
    let mut builder = GraphBuilder::new(registry);
    let st = builder.input(PlaceholderKind::Sparse);
    let values = builder.get_property(&st, "values").unwrap();
    let scaled = builder
        .call(&api().multiply, CallArgs::new().arg(values).arg(10.0))
        .unwrap();
    let out = placeholder(
        &builder
            .call_method(&st, "with_values", CallArgs::new().arg(scaled))
            .unwrap(),
    );
    assert_eq!(out.kind(), PlaceholderKind::Sparse);

    let sparse = SparseTensor::new(
        vec![vec![0, 1], vec![1, 0]],
        DenseTensor::vector_f64(vec![1.0, 2.0]),
        vec![2, 2],
    )
    .unwrap();
    let graph = builder.build(&[out.into()]).unwrap();
    let outputs = graph
        .execute(vec![Value::from(Tensor::Sparse(sparse))])
        .unwrap();
    let Value::Tensor(Tensor::Sparse(result)) = &outputs[0] else {
        panic!("expected a sparse tensor, got {:?}", outputs[0]);
    };
    assert_eq!(result.indices(), &[vec![0, 1], vec![1, 0]]);
    assert_eq!(result.dense_shape(), &[2, 2]);
    assert_close(&result.values().clone().into(), &[10.0, 20.0]);
}
