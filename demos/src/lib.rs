//! rankbench Demo Plug-ins
//!
//! One exercise family, registered for the CLI in sequential and parallel
//! variants over several element types:
//!
//! ```text
//! cargo run -p rankbench-demos -- list
//! cargo run -p rankbench-demos -- check --ranks 3
//! cargo run -p rankbench-demos -- vector_sum --ranks 4 --mode compute
//! ```
//!
//! Rank 0 owns the input; other ranks start from an empty descriptor.

pub mod vector;

use rankbench::prelude::*;
use vector::{VectorPar, VectorSeq, reduce_all};

/// Elements in the generated demo inputs
pub const DEMO_LEN: usize = 1 << 18;

/// Link the registrations below into a binary
pub fn register() {}

/// Demo input on rank 0: small non-negative values, so that sums are exact
/// in every element type and independent of combination order
pub fn demo_input<T: BufferElement + From<u8>>(comm: &Communicator) -> SharedTaskData {
    if !comm.is_root() {
        return SharedTaskData::default();
    }
    let values = (0..DEMO_LEN)
        .map(|i| T::from(((i * 7919) % 251) as u8))
        .collect();
    TaskData::new()
        .with_input(values)
        .with_output::<T>(1)
        .into()
}

fn output_matches<T: BufferElement>(data: &SharedTaskData, op: ReduceOp) -> bool {
    let data = data.read();
    let expected = data.input::<T>(0).and_then(|input| reduce_all(input, op));
    expected.is_some() && data.output::<T>(0).map(|out| out.first().copied()) == Some(expected)
}

// ============================================================================
// Vector sum
// ============================================================================

fn build_sum_seq<T: BufferElement>(data: SharedTaskData, _comm: &Communicator) -> Box<dyn Task> {
    Box::new(VectorSeq::<T>::new(data, ReduceOp::Sum))
}

fn build_sum_par<T: BufferElement>(data: SharedTaskData, comm: &Communicator) -> Box<dyn Task> {
    Box::new(VectorPar::<T>::new(data, comm, ReduceOp::Sum))
}

fn check_sum<T: BufferElement>(data: &SharedTaskData) -> bool {
    output_matches::<T>(data, ReduceOp::Sum)
}

register_task! {
    id: "vector_sum_seq_i32",
    group: "vector_sum",
    variant: "seq",
    tags: ["sum", "i32"],
    data: demo_input::<i32>,
    build: build_sum_seq::<i32>,
    verify: check_sum::<i32>,
}

register_task! {
    id: "vector_sum_par_i32",
    group: "vector_sum",
    variant: "par",
    tags: ["sum", "i32"],
    data: demo_input::<i32>,
    build: build_sum_par::<i32>,
    verify: check_sum::<i32>,
}

register_task! {
    id: "vector_sum_seq_f64",
    group: "vector_sum",
    variant: "seq",
    tags: ["sum", "f64"],
    data: demo_input::<f64>,
    build: build_sum_seq::<f64>,
    verify: check_sum::<f64>,
}

register_task! {
    id: "vector_sum_par_f64",
    group: "vector_sum",
    variant: "par",
    tags: ["sum", "f64"],
    data: demo_input::<f64>,
    build: build_sum_par::<f64>,
    verify: check_sum::<f64>,
}

// ============================================================================
// Vector min
// ============================================================================

fn build_min_seq<T: BufferElement>(data: SharedTaskData, _comm: &Communicator) -> Box<dyn Task> {
    Box::new(VectorSeq::<T>::new(data, ReduceOp::Min))
}

fn build_min_par<T: BufferElement>(data: SharedTaskData, comm: &Communicator) -> Box<dyn Task> {
    Box::new(VectorPar::<T>::new(data, comm, ReduceOp::Min))
}

fn check_min<T: BufferElement>(data: &SharedTaskData) -> bool {
    output_matches::<T>(data, ReduceOp::Min)
}

register_task! {
    id: "vector_min_seq_i64",
    group: "vector_min",
    variant: "seq",
    tags: ["min", "i64"],
    data: demo_input::<i64>,
    build: build_min_seq::<i64>,
    verify: check_min::<i64>,
}

register_task! {
    id: "vector_min_par_i64",
    group: "vector_min",
    variant: "par",
    tags: ["min", "i64"],
    data: demo_input::<i64>,
    build: build_min_par::<i64>,
    verify: check_min::<i64>,
}
