//! Cooperative script threads and the per-tick driver

use super::animation::Animation;
use super::{Axis, Module, Opcode, Script};
use crate::model::{ModelTable, UnitInstance};
use crate::{ForgeError, Result};
use log::{debug, error, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

/// Instructions a thread may execute in one tick before it is forced to yield
pub const MAX_STEPS_PER_SLICE: usize = 100_000;

/// Fault raised while executing a thread
///
/// These errors end the faulting thread only; the rest of the context keeps
/// running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Code word is not a known opcode
    #[error("Bad opcode: {0:#010X}")]
    BadOpcode(i32),

    /// Local variable index outside the current frame
    #[error("Bad local index: {0}")]
    BadLocal(i32),

    /// Static variable index outside the static table
    #[error("Bad static index: {0}")]
    BadStatic(i32),

    /// Module index outside the module table
    #[error("Bad module index: {0}")]
    BadModule(i32),

    /// Piece index outside the script's piece table
    #[error("Bad piece index: {0}")]
    BadPiece(i32),

    /// Axis operand other than 0, 1 or 2
    #[error("Bad axis: {0}")]
    BadAxis(i32),

    /// Instruction pointer or immediate outside the code array
    #[error("Bad code offset: {0}")]
    BadCodeOffset(i64),

    /// Pop from an empty operand stack
    #[error("Stack underflow")]
    StackUnderflow,

    /// Integer division by zero
    #[error("Division by zero")]
    DivisionByZero,
}

/// Host services used by a running script
///
/// Only the clock is required. The remaining hooks default to logging the
/// request and, where a value is expected, answering zero.
pub trait ScriptMachine {
    /// Current simulation time in seconds
    fn time(&self) -> f64;

    /// Answer a get-unit-value query
    fn unit_value(&mut self, value: i32) -> i32 {
        trace!("get-unit-value {value}");
        0
    }

    /// Apply a set-unit-value request
    fn set_unit_value(&mut self, value: i32, to: i32) {
        debug!("set-unit-value {value} = {to}");
    }

    /// Play a named sound
    fn play_sound(&mut self, name: &str) {
        debug!("play-sound {name}");
    }

    /// Blow a piece off the unit
    fn explode(&mut self, piece: usize, kind: i32) {
        debug!("explode piece {piece} type {kind}");
    }

    /// Emit a special effect at a piece
    fn emit_sfx(&mut self, piece: usize) {
        trace!("emit-sfx at piece {piece}");
    }
}

/// Scheduling state of a thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThreadStatus {
    /// Executing instructions
    Running,
    /// Blocked until the clock reaches the given time
    Sleeping(f64),
    /// Blocked until no translation of the model piece along the axis is pending
    WaitingForMove {
        /// Model piece index
        piece: usize,
        /// Axis of the awaited move
        axis: Axis,
    },
    /// Blocked until no rotation of the model piece around the axis is pending
    WaitingForTurn {
        /// Model piece index
        piece: usize,
        /// Axis of the awaited turn
        axis: Axis,
    },
    /// Done; reaped at the end of the tick
    Finished,
}

/// Outcome of executing one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Keep executing
    Continue,
    /// The thread blocked; resume on a later tick
    Blocked,
    /// The thread finished
    Done,
    /// The instruction faulted; the thread is finished
    Errored(ExecutionError),
}

/// One cooperative thread of execution
///
/// The stack holds one frame per active call: the frame slot with the
/// instruction pointer, then parameters, then locals, then operands. Nested
/// frames are preceded by the caller's saved frame pointer.
#[derive(Debug, Clone)]
pub struct Thread {
    pub(super) id: u64,
    pub(super) stack: Vec<i32>,
    pub(super) frame_pointer: usize,
    pub(super) status: ThreadStatus,
    pub(super) signal_mask: i32,
}

/// Context state visible to an executing instruction
pub(super) struct Process<'a> {
    pub script: &'a Script,
    pub statics: &'a mut [i32],
    pub animations: &'a mut Vec<Animation>,
    pub piece_map: &'a [usize],
    pub rng: &'a mut StdRng,
    pub spawned: &'a mut Vec<Thread>,
    pub signals: &'a mut Vec<i32>,
    pub next_thread_id: &'a mut u64,
    pub instance: &'a UnitInstance,
    pub machine: &'a mut dyn ScriptMachine,
}

impl<'a> Process<'a> {
    pub fn piece(&self, index: i32) -> std::result::Result<usize, ExecutionError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.piece_map.get(i).copied())
            .ok_or(ExecutionError::BadPiece(index))
    }

    pub fn module(&self, index: i32) -> std::result::Result<&'a Module, ExecutionError> {
        let script: &'a Script = self.script;
        usize::try_from(index)
            .ok()
            .and_then(|i| script.modules.get(i))
            .ok_or(ExecutionError::BadModule(index))
    }

    pub fn static_slot(&mut self, index: i32) -> std::result::Result<&mut i32, ExecutionError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.statics.get_mut(i))
            .ok_or(ExecutionError::BadStatic(index))
    }

    pub fn spawn(&mut self, module: &Module, parameters: &[i32]) {
        let id = *self.next_thread_id;
        *self.next_thread_id += 1;
        trace!("start-script {} -> thread {}", module.name, id);
        self.spawned.push(Thread::new(id, module, parameters));
    }
}

impl Thread {
    /// A thread positioned at the start of `module`
    pub fn new(id: u64, module: &Module, parameters: &[i32]) -> Self {
        let mut thread = Self {
            id,
            stack: Vec::with_capacity(16),
            frame_pointer: 0,
            status: ThreadStatus::Running,
            signal_mask: 0,
        };
        thread.push_frame(module, parameters);
        thread
    }

    /// Thread identifier, unique within its context
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current scheduling state
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    /// Signal mask set by the script
    pub fn signal_mask(&self) -> i32 {
        self.signal_mask
    }

    /// Whole operand stack, frames included
    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    /// Index of the current frame slot
    pub fn frame_pointer(&self) -> usize {
        self.frame_pointer
    }

    /// Whether the thread has finished
    pub fn is_finished(&self) -> bool {
        self.status == ThreadStatus::Finished
    }

    /// Whether a signal with `mask` terminates this thread
    pub fn is_signaled_by(&self, mask: i32) -> bool {
        self.signal_mask & mask != 0
    }

    fn push_frame(&mut self, module: &Module, parameters: &[i32]) {
        self.stack.push(module.offset as i32);
        self.stack.extend_from_slice(parameters);
        let zeros = module.local_count.saturating_sub(parameters.len());
        self.stack.resize(self.stack.len() + zeros, 0);
    }

    /// Instruction pointer of the current frame
    pub fn instruction_pointer(&self) -> std::result::Result<usize, ExecutionError> {
        let raw = *self
            .stack
            .get(self.frame_pointer)
            .ok_or(ExecutionError::StackUnderflow)?;
        usize::try_from(raw).map_err(|_| ExecutionError::BadCodeOffset(raw as i64))
    }

    pub(super) fn set_instruction_pointer(&mut self, ip: usize) {
        self.stack[self.frame_pointer] = ip as i32;
    }

    pub(super) fn advance(&mut self, words: usize) -> std::result::Result<(), ExecutionError> {
        let ip = self.instruction_pointer()?;
        self.set_instruction_pointer(ip + words);
        Ok(())
    }

    pub(super) fn push(&mut self, value: i32) {
        self.stack.push(value);
    }

    /// Pop an operand; the current frame slot is never popped
    pub(super) fn pop(&mut self) -> std::result::Result<i32, ExecutionError> {
        if self.stack.len() <= self.frame_pointer + 1 {
            return Err(ExecutionError::StackUnderflow);
        }
        self.stack.pop().ok_or(ExecutionError::StackUnderflow)
    }

    /// Pop `count` operands, returned in the order they were pushed
    pub(super) fn pop_many(&mut self, count: i32) -> std::result::Result<Vec<i32>, ExecutionError> {
        let count = usize::try_from(count).map_err(|_| ExecutionError::StackUnderflow)?;
        if self.stack.len() < self.frame_pointer + 1 + count {
            return Err(ExecutionError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn local_offset(&self, index: i32) -> std::result::Result<usize, ExecutionError> {
        usize::try_from(index)
            .ok()
            .map(|i| self.frame_pointer + 1 + i)
            .filter(|&offset| offset < self.stack.len())
            .ok_or(ExecutionError::BadLocal(index))
    }

    pub(super) fn local(&self, index: i32) -> std::result::Result<i32, ExecutionError> {
        Ok(self.stack[self.local_offset(index)?])
    }

    pub(super) fn set_local(&mut self, index: i32, value: i32) -> std::result::Result<(), ExecutionError> {
        let offset = self.local_offset(index)?;
        self.stack[offset] = value;
        Ok(())
    }

    /// Enter `module` as a nested call
    pub(super) fn call(&mut self, module: &Module, parameters: &[i32]) {
        trace!("[{}] call-script {}", self.id, module.name);
        self.stack.push(self.frame_pointer as i32);
        self.frame_pointer = self.stack.len();
        self.push_frame(module, parameters);
    }

    /// Leave the current frame; returning from the outermost frame finishes the thread
    pub(super) fn return_from_frame(&mut self) -> std::result::Result<(), ExecutionError> {
        if self.frame_pointer == 0 {
            self.status = ThreadStatus::Finished;
            return Ok(());
        }

        let link = self.frame_pointer - 1;
        let saved = self.stack[link];
        self.frame_pointer =
            usize::try_from(saved).map_err(|_| ExecutionError::BadCodeOffset(saved as i64))?;
        self.stack.truncate(link);
        Ok(())
    }

    /// Resume a blocked thread whose condition is met
    fn resume_if_ready(&mut self, clock: f64, animations: &[Animation]) {
        let ready = match self.status {
            ThreadStatus::Sleeping(wake) => clock >= wake,
            ThreadStatus::WaitingForMove { piece, axis } => {
                !animations.iter().any(|a| a.is_move_of(piece, axis))
            }
            ThreadStatus::WaitingForTurn { piece, axis } => {
                !animations.iter().any(|a| a.is_turn_of(piece, axis))
            }
            ThreadStatus::Running | ThreadStatus::Finished => false,
        };
        if ready {
            trace!("[{}] resumed from {:?}", self.id, self.status);
            self.status = ThreadStatus::Running;
        }
    }

    /// Execute a single instruction
    pub(super) fn step(&mut self, process: &mut Process<'_>) -> StepResult {
        match self.status {
            ThreadStatus::Finished => return StepResult::Done,
            ThreadStatus::Running => {}
            _ => return StepResult::Blocked,
        }

        let outcome = self.instruction_pointer().and_then(|ip| {
            let raw = *process
                .script
                .code
                .get(ip)
                .ok_or(ExecutionError::BadCodeOffset(ip as i64))?;
            let opcode = Opcode::from_raw(raw).ok_or(ExecutionError::BadOpcode(raw))?;
            self.execute(opcode, ip, process)
        });

        match outcome {
            Err(e) => {
                self.status = ThreadStatus::Finished;
                StepResult::Errored(e)
            }
            Ok(()) => match self.status {
                ThreadStatus::Running => StepResult::Continue,
                ThreadStatus::Finished => StepResult::Done,
                _ => StepResult::Blocked,
            },
        }
    }
}

/// A script bound to a model, with its threads and pending animations
#[derive(Debug)]
pub struct Context {
    script: Script,
    statics: Vec<i32>,
    threads: Vec<Thread>,
    animations: Vec<Animation>,
    piece_map: Vec<usize>,
    rng: StdRng,
    next_thread_id: u64,
}

impl Context {
    /// Bind `script` to `model`, mapping script piece names to model pieces
    pub fn new(script: Script, model: &ModelTable) -> Result<Self> {
        Self::with_rng(script, model, StdRng::from_entropy())
    }

    /// Like [`Context::new`] with a deterministic random source
    pub fn with_seed(script: Script, model: &ModelTable, seed: u64) -> Result<Self> {
        Self::with_rng(script, model, StdRng::seed_from_u64(seed))
    }

    fn with_rng(script: Script, model: &ModelTable, rng: StdRng) -> Result<Self> {
        let piece_map = script
            .pieces
            .iter()
            .map(|name| {
                model
                    .piece_index(name)
                    .ok_or_else(|| ForgeError::UnknownPiece(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            statics: vec![0; script.static_count],
            script,
            threads: Vec::new(),
            animations: Vec::new(),
            piece_map,
            rng,
            next_thread_id: 0,
        })
    }

    /// The bound script
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Live threads in execution order
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Pending animations
    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    /// Static variables
    pub fn statics(&self) -> &[i32] {
        &self.statics
    }

    /// Model piece index of each script piece
    pub fn piece_map(&self) -> &[usize] {
        &self.piece_map
    }

    /// Start a thread at the named module, if it exists
    ///
    /// Returns the new thread's id.
    pub fn start_script(&mut self, name: &str, parameters: &[i32]) -> Option<u64> {
        let Some(module) = self.script.module_named(name) else {
            debug!("No module named {name}");
            return None;
        };
        let id = self.next_thread_id;
        self.next_thread_id += 1;
        self.threads.push(Thread::new(id, module, parameters));
        Some(id)
    }

    /// Run one tick
    ///
    /// Each thread present at the start of the tick runs until it blocks,
    /// finishes or faults. Threads started during the tick first run on the
    /// next one. Finished threads are removed afterwards.
    pub fn run<M: ScriptMachine>(&mut self, instance: &UnitInstance, machine: &mut M) {
        let clock = machine.time();
        let Context {
            script,
            statics,
            threads,
            animations,
            piece_map,
            rng,
            next_thread_id,
        } = self;

        let mut spawned = Vec::new();
        for index in 0..threads.len() {
            threads[index].resume_if_ready(clock, animations);

            for steps in 0.. {
                if steps == MAX_STEPS_PER_SLICE {
                    warn!(
                        "[{}] yielded after {} instructions without blocking",
                        threads[index].id, MAX_STEPS_PER_SLICE
                    );
                    break;
                }

                let mut signals = Vec::new();
                let result = {
                    let mut process = Process {
                        script: &*script,
                        statics: statics.as_mut_slice(),
                        animations: &mut *animations,
                        piece_map: piece_map.as_slice(),
                        rng: &mut *rng,
                        spawned: &mut spawned,
                        signals: &mut signals,
                        next_thread_id: &mut *next_thread_id,
                        instance,
                        machine: &mut *machine,
                    };
                    threads[index].step(&mut process)
                };

                for mask in signals {
                    trace!("[{}] signal {}", threads[index].id, mask);
                    let others = threads
                        .iter_mut()
                        .enumerate()
                        .filter(|&(other, _)| other != index)
                        .map(|(_, thread)| thread)
                        .chain(spawned.iter_mut());
                    for thread in others {
                        if thread.is_signaled_by(mask) {
                            thread.status = ThreadStatus::Finished;
                        }
                    }
                }

                match result {
                    StepResult::Continue => continue,
                    StepResult::Errored(e) => {
                        error!("[{}] Script error: {}", threads[index].id, e);
                        break;
                    }
                    StepResult::Blocked | StepResult::Done => break,
                }
            }
        }

        threads.extend(spawned);
        threads.retain(|thread| !thread.is_finished());
    }

    /// Integrate every pending animation by `delta` seconds
    pub fn apply_animations(&mut self, instance: &mut UnitInstance, delta: f64) {
        let pending = std::mem::take(&mut self.animations);
        self.animations = pending
            .into_iter()
            .filter_map(|animation| instance.apply(animation, delta))
            .collect();
    }

    /// Drop every thread and pending animation
    pub fn reset(&mut self) {
        self.threads.clear();
        self.animations.clear();
        self.statics.fill(0);
    }
}
