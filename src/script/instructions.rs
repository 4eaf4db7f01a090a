//! Instruction semantics

use super::animation::{Animation, PieceFlag, SetAngle, SetPosition};
use super::vm::{ExecutionError, Process, Thread, ThreadStatus};
use super::{as_angular, as_linear, Axis, Opcode};
use log::{debug, warn};
use rand::Rng;
use std::f64::consts::PI;

type Step = std::result::Result<(), ExecutionError>;

fn immediate(process: &Process<'_>, ip: usize, k: usize) -> std::result::Result<i32, ExecutionError> {
    process
        .script
        .code
        .get(ip + k)
        .copied()
        .ok_or(ExecutionError::BadCodeOffset((ip + k) as i64))
}

fn axis(raw: i32) -> std::result::Result<Axis, ExecutionError> {
    Axis::from_raw(raw).ok_or(ExecutionError::BadAxis(raw))
}

fn truth(value: i32) -> bool {
    value != 0
}

impl Thread {
    fn binary(&mut self, op: impl FnOnce(i32, i32) -> std::result::Result<i32, ExecutionError>) -> Step {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.push(op(lhs, rhs)?);
        Ok(())
    }

    fn compare(&mut self, op: impl FnOnce(i32, i32) -> bool) -> Step {
        self.binary(|lhs, rhs| Ok(op(lhs, rhs) as i32))
    }

    /// Piece and axis operands of a two-immediate piece instruction
    fn piece_axis(&self, process: &Process<'_>, ip: usize) -> std::result::Result<(usize, Axis), ExecutionError> {
        let piece = process.piece(immediate(process, ip, 1)?)?;
        let axis = axis(immediate(process, ip, 2)?)?;
        Ok((piece, axis))
    }

    /// Piece operand of a one-immediate piece instruction
    fn piece_operand(&self, process: &Process<'_>, ip: usize) -> std::result::Result<usize, ExecutionError> {
        process.piece(immediate(process, ip, 1)?)
    }

    /// Execute `opcode` located at `ip`
    pub(super) fn execute(&mut self, opcode: Opcode, ip: usize, process: &mut Process<'_>) -> Step {
        let width = opcode.width();

        match opcode {
            Opcode::MovePieceWithSpeed => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                let target = as_linear(self.pop()?);
                let speed = as_linear(self.pop()?);
                let animation = process.instance.begin_translation(piece, axis, target, speed);
                process.animations.push(animation);
            }
            Opcode::TurnPieceWithSpeed => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                let target = as_angular(self.pop()?);
                let speed = as_angular(self.pop()?);
                let animation = process.instance.begin_rotation(piece, axis, target, speed);
                process.animations.push(animation);
            }
            Opcode::StartSpin => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                let speed = as_angular(self.pop()?);
                let acceleration = as_angular(self.pop()?);
                let animation = process.instance.begin_spin(piece, axis, acceleration, speed);
                process.animations.push(animation);
            }
            Opcode::StopSpin => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                let deceleration = as_angular(self.pop()?);
                let spinning = process.animations.iter_mut().find(|animation| {
                    animation
                        .as_spin()
                        .is_some_and(|spin| spin.piece == piece && spin.axis == axis)
                });
                match spinning {
                    Some(animation) => {
                        if let Some(mut spin) = animation.as_spin().copied() {
                            spin.acceleration = deceleration * PI / 180.0;
                            *animation = Animation::SpinDown(spin);
                        }
                    }
                    None => debug!("[{}] stop-spin on piece {} without a spin", self.id, piece),
                }
            }
            Opcode::ShowPiece => {
                let piece = self.piece_operand(process, ip)?;
                process.animations.push(Animation::Show(piece));
            }
            Opcode::HidePiece => {
                let piece = self.piece_operand(process, ip)?;
                process.animations.push(Animation::Hide(piece));
            }
            Opcode::CachePiece | Opcode::DontCachePiece | Opcode::DontShade | Opcode::DontShadow => {
                let piece = self.piece_operand(process, ip)?;
                let (flag, enabled) = match opcode {
                    Opcode::CachePiece => (PieceFlag::Cache, true),
                    Opcode::DontCachePiece => (PieceFlag::Cache, false),
                    Opcode::DontShade => (PieceFlag::Shade, false),
                    _ => (PieceFlag::Shadow, false),
                };
                process.animations.push(Animation::SetFlag { piece, flag, enabled });
            }
            Opcode::MovePieceNow => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                let target = as_linear(self.pop()?);
                process
                    .animations
                    .push(Animation::SetPosition(SetPosition { piece, axis, target }));
            }
            Opcode::TurnPieceNow => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                let target = as_angular(self.pop()?);
                process
                    .animations
                    .push(Animation::SetAngle(SetAngle { piece, axis, target }));
            }
            Opcode::EmitSfx => {
                let piece = self.piece_operand(process, ip)?;
                process.machine.emit_sfx(piece);
            }
            Opcode::WaitForTurn => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                self.status = ThreadStatus::WaitingForTurn { piece, axis };
            }
            Opcode::WaitForMove => {
                let (piece, axis) = self.piece_axis(process, ip)?;
                self.status = ThreadStatus::WaitingForMove { piece, axis };
            }
            Opcode::Sleep => {
                let duration = self.pop()?;
                self.status = ThreadStatus::Sleeping(process.machine.time() + duration as f64 / 1500.0);
            }

            Opcode::PushConstant => self.push(immediate(process, ip, 1)?),
            Opcode::PushLocal => {
                let value = self.local(immediate(process, ip, 1)?)?;
                self.push(value);
            }
            Opcode::PushStatic => {
                let index = immediate(process, ip, 1)?;
                let value = *process.static_slot(index)?;
                self.push(value);
            }
            Opcode::StackAllocate => self.push(0),
            Opcode::SetLocal => {
                let index = immediate(process, ip, 1)?;
                let value = self.pop()?;
                self.set_local(index, value)?;
            }
            Opcode::SetStatic => {
                let index = immediate(process, ip, 1)?;
                let value = self.pop()?;
                *process.static_slot(index)? = value;
            }
            Opcode::PopStack => {
                self.pop()?;
            }

            Opcode::Add => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
            Opcode::Subtract => self.binary(|a, b| Ok(a.wrapping_sub(b)))?,
            Opcode::Multiply => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
            Opcode::Divide => self.binary(|a, b| {
                if b == 0 {
                    Err(ExecutionError::DivisionByZero)
                } else {
                    Ok(a.wrapping_div(b))
                }
            })?,
            Opcode::BitwiseAnd => self.binary(|a, b| Ok(a & b))?,
            Opcode::BitwiseOr => self.binary(|a, b| Ok(a | b))?,
            Opcode::Unknown1 | Opcode::Unknown2 | Opcode::Unknown3 => {
                warn!("[{}] {} treated as add", self.id, opcode);
                self.binary(|a, b| Ok(a.wrapping_add(b)))?;
            }

            Opcode::Random => {
                let max = self.pop()?;
                let min = self.pop()?;
                let value = if min >= max {
                    min
                } else {
                    process.rng.gen_range(min..=max)
                };
                self.push(value);
            }
            Opcode::GetUnitValue => {
                let what = self.pop()?;
                let value = process.machine.unit_value(what);
                self.push(value);
            }
            Opcode::GetFunctionResult => {
                let parameters = self.pop_many(4)?;
                let what = self.pop()?;
                debug!("[{}] get-function-result {} {:?}", self.id, what, parameters);
                self.push(0);
            }

            Opcode::LessThan => self.compare(|a, b| a < b)?,
            Opcode::LessThanOrEqual => self.compare(|a, b| a <= b)?,
            Opcode::GreaterThan => self.compare(|a, b| a > b)?,
            Opcode::GreaterThanOrEqual => self.compare(|a, b| a >= b)?,
            Opcode::Equal => self.compare(|a, b| a == b)?,
            Opcode::NotEqual => self.compare(|a, b| a != b)?,
            Opcode::And => self.compare(|a, b| truth(a) && truth(b))?,
            Opcode::Or => self.compare(|a, b| truth(a) || truth(b))?,
            Opcode::Not => {
                let value = self.pop()?;
                self.push(!truth(value) as i32);
            }

            Opcode::StartScript => {
                let module = process.module(immediate(process, ip, 1)?)?;
                let parameters = self.pop_many(immediate(process, ip, 2)?)?;
                process.spawn(module, &parameters);
            }
            Opcode::CallScript => {
                let module = process.module(immediate(process, ip, 1)?)?;
                let parameters = self.pop_many(immediate(process, ip, 2)?)?;
                self.set_instruction_pointer(ip + width);
                self.call(module, &parameters);
                return Ok(());
            }
            Opcode::Jump => {
                let target = immediate(process, ip, 1)?;
                let target = usize::try_from(target)
                    .map_err(|_| ExecutionError::BadCodeOffset(target as i64))?;
                self.set_instruction_pointer(target);
                return Ok(());
            }
            Opcode::Return => {
                let value = self.pop()?;
                debug!("[{}] return {}", self.id, value);
                self.set_instruction_pointer(ip + width);
                return self.return_from_frame();
            }
            Opcode::JumpIfFalse => {
                let target = immediate(process, ip, 1)?;
                if truth(self.pop()?) {
                    self.set_instruction_pointer(ip + width);
                } else {
                    let target = usize::try_from(target)
                        .map_err(|_| ExecutionError::BadCodeOffset(target as i64))?;
                    self.set_instruction_pointer(target);
                }
                return Ok(());
            }
            Opcode::Signal => {
                let mask = self.pop()?;
                process.signals.push(mask);
            }
            Opcode::SetSignalMask => {
                self.signal_mask = self.pop()?;
            }

            Opcode::Explode => {
                let piece = self.piece_operand(process, ip)?;
                let kind = self.pop()?;
                process.machine.explode(piece, kind);
            }
            Opcode::PlaySound => {
                let index = immediate(process, ip, 1)?;
                match usize::try_from(index).ok().and_then(|i| process.script.sounds.get(i)) {
                    Some(name) => process.machine.play_sound(name),
                    None => debug!("[{}] play-sound with unknown sound {}", self.id, index),
                }
            }
            Opcode::MapCommand => {
                debug!(
                    "[{}] map-command {} {}",
                    self.id,
                    immediate(process, ip, 1)?,
                    immediate(process, ip, 2)?
                );
            }
            Opcode::SetUnitValue => {
                let value = self.pop()?;
                let what = self.pop()?;
                process.machine.set_unit_value(what, value);
            }
            Opcode::AttachUnit => {
                let operands = self.pop_many(3)?;
                debug!("[{}] attach-unit {:?}", self.id, operands);
            }
            Opcode::DropUnit => {
                let unit = self.pop()?;
                debug!("[{}] drop-unit {}", self.id, unit);
            }
        }

        self.advance(width)
    }
}
