//! Task Descriptor
//!
//! Typed input and output buffers handed from a caller to a task. The harness
//! never looks inside them; tasks read them through bounds-checked views.

use rankbench_comm::{Element, ElementType};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A fixed-length buffer of one element type
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    /// `u8` elements
    U8(Vec<u8>),
    /// `i32` elements
    I32(Vec<i32>),
    /// `i64` elements
    I64(Vec<i64>),
    /// `u32` elements
    U32(Vec<u32>),
    /// `u64` elements
    U64(Vec<u64>),
    /// `f32` elements
    F32(Vec<f32>),
    /// `f64` elements
    F64(Vec<f64>),
}

/// Element types a `Buffer` can hold
pub trait BufferElement: Element + Default {
    /// Wrap a vector in the matching `Buffer` variant
    fn into_buffer(values: Vec<Self>) -> Buffer;

    /// Borrow the buffer's elements if it holds `Self`
    fn view(buffer: &Buffer) -> Option<&[Self]>;

    /// Mutably borrow the buffer's elements if it holds `Self`
    fn view_mut(buffer: &mut Buffer) -> Option<&mut [Self]>;
}

macro_rules! impl_buffer_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl BufferElement for $ty {
                fn into_buffer(values: Vec<Self>) -> Buffer {
                    Buffer::$variant(values)
                }

                fn view(buffer: &Buffer) -> Option<&[Self]> {
                    match buffer {
                        Buffer::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                fn view_mut(buffer: &mut Buffer) -> Option<&mut [Self]> {
                    match buffer {
                        Buffer::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_buffer_element!(
    u8 => U8,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

impl Buffer {
    /// Buffer holding `values`
    pub fn from_vec<T: BufferElement>(values: Vec<T>) -> Self {
        T::into_buffer(values)
    }

    /// Buffer of `len` zeroes of type `T`
    pub fn zeroed<T: BufferElement>(len: usize) -> Self {
        T::into_buffer(vec![T::default(); len])
    }

    /// Element type tag
    pub fn element_type(&self) -> ElementType {
        match self {
            Buffer::U8(_) => ElementType::U8,
            Buffer::I32(_) => ElementType::I32,
            Buffer::I64(_) => ElementType::I64,
            Buffer::U32(_) => ElementType::U32,
            Buffer::U64(_) => ElementType::U64,
            Buffer::F32(_) => ElementType::F32,
            Buffer::F64(_) => ElementType::F64,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Buffer::U8(v) => v.len(),
            Buffer::I32(v) => v.len(),
            Buffer::I64(v) => v.len(),
            Buffer::U32(v) => v.len(),
            Buffer::U64(v) => v.len(),
            Buffer::F32(v) => v.len(),
            Buffer::F64(v) => v.len(),
        }
    }

    /// Whether the buffer has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements as `T`, `None` on a type mismatch
    pub fn as_slice<T: BufferElement>(&self) -> Option<&[T]> {
        T::view(self)
    }

    /// Mutable elements as `T`, `None` on a type mismatch
    pub fn as_mut_slice<T: BufferElement>(&mut self) -> Option<&mut [T]> {
        T::view_mut(self)
    }
}

/// How the descriptor is being exercised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TestingMode {
    /// Correctness run: inputs are small, outputs are checked
    #[default]
    Functional,
    /// Timing run: inputs may be large, tasks may choose leaner allocation
    Performance,
}

/// Input and output buffers of one task instance, with their element counts.
///
/// Counts default to the buffer length and may be overwritten by the caller
/// (a matrix, for example, records its dimensions).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskData {
    inputs: Vec<Buffer>,
    /// Element counts, index-aligned with the inputs
    pub inputs_count: Vec<usize>,
    outputs: Vec<Buffer>,
    /// Element counts, index-aligned with the outputs
    pub outputs_count: Vec<usize>,
    /// Execution mode tag
    pub state_of_testing: TestingMode,
}

impl TaskData {
    /// Empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input buffer, recording its length as its count
    pub fn push_input(&mut self, buffer: Buffer) {
        self.inputs_count.push(buffer.len());
        self.inputs.push(buffer);
    }

    /// Add an output buffer, recording its length as its count
    pub fn push_output(&mut self, buffer: Buffer) {
        self.outputs_count.push(buffer.len());
        self.outputs.push(buffer);
    }

    /// Builder form of `push_input`
    pub fn with_input<T: BufferElement>(mut self, values: Vec<T>) -> Self {
        self.push_input(Buffer::from_vec(values));
        self
    }

    /// Builder form of `push_output` with a zero-filled buffer of `len` elements
    pub fn with_output<T: BufferElement>(mut self, len: usize) -> Self {
        self.push_output(Buffer::zeroed::<T>(len));
        self
    }

    /// Builder form of setting the execution mode
    pub fn with_mode(mut self, mode: TestingMode) -> Self {
        self.state_of_testing = mode;
        self
    }

    /// All input buffers
    pub fn inputs(&self) -> &[Buffer] {
        &self.inputs
    }

    /// All output buffers
    pub fn outputs(&self) -> &[Buffer] {
        &self.outputs
    }

    /// Input `index` viewed as `T`
    pub fn input<T: BufferElement>(&self, index: usize) -> Option<&[T]> {
        self.inputs.get(index)?.as_slice()
    }

    /// Output `index` viewed as `T`
    pub fn output<T: BufferElement>(&self, index: usize) -> Option<&[T]> {
        self.outputs.get(index)?.as_slice()
    }

    /// Output `index` viewed as writable `T` elements. The view cannot grow or
    /// shrink the buffer.
    pub fn output_mut<T: BufferElement>(&mut self, index: usize) -> Option<&mut [T]> {
        self.outputs.get_mut(index)?.as_mut_slice()
    }

    /// Whether every buffer has exactly one count
    pub fn is_well_formed(&self) -> bool {
        self.inputs.len() == self.inputs_count.len()
            && self.outputs.len() == self.outputs_count.len()
    }
}

/// Shared handle on a `TaskData`, held by both the task and its caller
#[derive(Debug, Clone, Default)]
pub struct SharedTaskData {
    inner: Arc<RwLock<TaskData>>,
}

impl SharedTaskData {
    /// Share `data`
    pub fn new(data: TaskData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Read access. A poisoned lock is recovered: the buffers stay valid
    /// even if a writer panicked.
    pub fn read(&self) -> RwLockReadGuard<'_, TaskData> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access, with the same poison recovery as `read`
    pub fn write(&self) -> RwLockWriteGuard<'_, TaskData> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of output `index` as `T`, for assertions after a run
    pub fn output_vec<T: BufferElement>(&self, index: usize) -> Option<Vec<T>> {
        self.read().output::<T>(index).map(<[T]>::to_vec)
    }
}

impl From<TaskData> for SharedTaskData {
    fn from(data: TaskData) -> Self {
        Self::new(data)
    }
}
