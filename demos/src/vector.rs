//! Whole-vector reductions
//!
//! `VectorSeq` folds its input on one rank. `VectorPar` scatters rank 0's
//! input, folds each chunk locally and combines the partials on rank 0.
//! Both write the single result to output 0.

use rankbench::prelude::*;

/// Fold `values` with `op`; `None` for an empty slice
pub fn fold<T: Element>(values: &[T], op: ReduceOp) -> Option<T> {
    values.iter().copied().reduce(|acc, value| acc.combine(value, op))
}

/// Whole-vector result of `op`, where an empty sum is zero
pub fn reduce_all<T: BufferElement>(values: &[T], op: ReduceOp) -> Option<T> {
    match op {
        ReduceOp::Sum => Some(fold(values, op).unwrap_or_default()),
        _ => fold(values, op),
    }
}

/// Whether `data` describes one non-empty `T` input and one `T` output
fn describes_reduction<T: BufferElement>(data: &TaskData) -> bool {
    if !data.is_well_formed() {
        return false;
    }
    let (Some(input), Some(output)) = (data.input::<T>(0), data.output::<T>(0)) else {
        return false;
    };
    !input.is_empty()
        && data.inputs_count == [input.len()]
        && data.outputs_count == [1]
        && !output.is_empty()
}

fn write_result<T: BufferElement>(data: &SharedTaskData, value: T) -> bool {
    match data.write().output_mut::<T>(0) {
        Some(out) => {
            out[0] = value;
            true
        }
        None => false,
    }
}

/// Sequential reduction of input 0
pub struct VectorSeq<T> {
    data: SharedTaskData,
    op: ReduceOp,
    input: Vec<T>,
    result: Option<T>,
}

impl<T: BufferElement> VectorSeq<T> {
    /// Task reducing `data`'s input 0 with `op`
    pub fn new(data: SharedTaskData, op: ReduceOp) -> Self {
        Self {
            data,
            op,
            input: Vec::new(),
            result: None,
        }
    }
}

impl<T: BufferElement> Task for VectorSeq<T> {
    fn validate(&mut self) -> bool {
        describes_reduction::<T>(&self.data.read())
    }

    fn preprocess(&mut self) -> bool {
        match self.data.read().input::<T>(0) {
            Some(input) => {
                self.input = input.to_vec();
                true
            }
            None => false,
        }
    }

    fn compute(&mut self) -> bool {
        self.result = reduce_all(&self.input, self.op);
        self.result.is_some()
    }

    fn postprocess(&mut self) -> bool {
        self.result
            .is_some_and(|value| write_result(&self.data, value))
    }
}

/// Distributed reduction of rank 0's input 0
pub struct VectorPar<T> {
    data: SharedTaskData,
    comm: Communicator,
    op: ReduceOp,
    input: Vec<T>,
    result: Option<T>,
}

impl<T: BufferElement> VectorPar<T> {
    /// Task reducing rank 0's input 0 with `op` across the ranks of `comm`
    pub fn new(data: SharedTaskData, comm: &Communicator, op: ReduceOp) -> Self {
        Self {
            data,
            comm: comm.clone(),
            op,
            input: Vec::new(),
            result: None,
        }
    }
}

impl<T: BufferElement> Task for VectorPar<T> {
    fn validate(&mut self) -> bool {
        let ok = !self.comm.is_root() || describes_reduction::<T>(&self.data.read());
        self.comm.broadcast_value(u8::from(ok), 0) == 1
    }

    fn preprocess(&mut self) -> bool {
        if !self.comm.is_root() {
            return true;
        }
        match self.data.read().input::<T>(0) {
            Some(input) => {
                self.input = input.to_vec();
                true
            }
            None => false,
        }
    }

    fn compute(&mut self) -> bool {
        let local = self.comm.scatter(&self.input, 0);
        // Ranks left without elements contribute nothing
        let partial: Vec<T> = fold(&local, self.op).into_iter().collect();
        self.result = self
            .comm
            .gather(&partial, 0)
            .and_then(|partials| reduce_all(&partials, self.op));
        !self.comm.is_root() || self.result.is_some()
    }

    fn postprocess(&mut self) -> bool {
        if !self.comm.is_root() {
            return true;
        }
        self.result
            .is_some_and(|value| write_result(&self.data, value))
    }
}
