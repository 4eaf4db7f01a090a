//! Instruction set of compiled unit scripts

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $value:literal, $immediates:literal, $mnemonic:literal;)*) => {
        /// A script instruction opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                $(#[$doc])*
                $name,
            )*
        }

        impl Opcode {
            /// Every opcode in encoding order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Map a raw code word to an opcode
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Encoded value of the opcode
            pub fn raw(self) -> i32 {
                match self {
                    $(Opcode::$name => $value,)*
                }
            }

            /// Number of immediate operands following the opcode in the code stream
            pub fn immediate_count(self) -> usize {
                match self {
                    $(Opcode::$name => $immediates,)*
                }
            }

            /// Assembly mnemonic
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    /// Animate a translation: pops destination then speed
    MovePieceWithSpeed = 0x10001000, 2, "move";
    /// Animate a rotation: pops destination then speed
    TurnPieceWithSpeed = 0x10002000, 2, "turn";
    /// Start a continuous rotation: pops speed then acceleration
    StartSpin = 0x10003000, 2, "spin";
    /// Ramp down a running spin: pops deceleration
    StopSpin = 0x10004000, 2, "stop-spin";
    ShowPiece = 0x10005000, 1, "show";
    HidePiece = 0x10006000, 1, "hide";
    CachePiece = 0x10007000, 1, "cache";
    DontCachePiece = 0x10008000, 1, "dont-cache";
    DontShadow = 0x1000A000, 1, "dont-shadow";
    /// Set a translation immediately: pops destination
    MovePieceNow = 0x1000B000, 2, "move-now";
    /// Set a rotation immediately: pops destination
    TurnPieceNow = 0x1000C000, 2, "turn-now";
    DontShade = 0x1000E000, 1, "dont-shade";
    EmitSfx = 0x1000F000, 1, "emit-sfx";
    WaitForTurn = 0x10011000, 2, "wait-for-turn";
    WaitForMove = 0x10012000, 2, "wait-for-move";
    /// Block the thread: pops a duration in milliseconds scaled by 1.5
    Sleep = 0x10013000, 0, "sleep";
    PushConstant = 0x10021001, 1, "push-constant";
    PushLocal = 0x10021002, 1, "push-local";
    PushStatic = 0x10021004, 1, "push-static";
    /// Push a zero; module prologues use one per local variable
    StackAllocate = 0x10022000, 0, "stack-allocate";
    SetLocal = 0x10023002, 1, "set-local";
    SetStatic = 0x10023004, 1, "set-static";
    PopStack = 0x10024000, 0, "pop";
    Add = 0x10031000, 0, "add";
    Subtract = 0x10032000, 0, "sub";
    Multiply = 0x10033000, 0, "mul";
    Divide = 0x10034000, 0, "div";
    BitwiseAnd = 0x10035000, 0, "bitand";
    BitwiseOr = 0x10036000, 0, "bitor";
    Unknown1 = 0x10039000, 0, "unknown-1";
    Unknown2 = 0x1003A000, 0, "unknown-2";
    Unknown3 = 0x1003B000, 0, "unknown-3";
    Random = 0x10041000, 0, "random";
    GetUnitValue = 0x10042000, 0, "get-unit-value";
    GetFunctionResult = 0x10043000, 0, "get-function-result";
    LessThan = 0x10051000, 0, "lt";
    LessThanOrEqual = 0x10052000, 0, "le";
    GreaterThan = 0x10053000, 0, "gt";
    GreaterThanOrEqual = 0x10054000, 0, "ge";
    Equal = 0x10055000, 0, "eq";
    NotEqual = 0x10056000, 0, "ne";
    And = 0x10057000, 0, "and";
    Or = 0x10058000, 0, "or";
    Not = 0x1005A000, 0, "not";
    /// Spawn a thread: module index, parameter count
    StartScript = 0x10061000, 2, "start-script";
    /// Nested call: module index, parameter count
    CallScript = 0x10062000, 2, "call-script";
    Jump = 0x10064000, 1, "jump";
    Return = 0x10065000, 0, "return";
    JumpIfFalse = 0x10066000, 1, "jump-if-false";
    Signal = 0x10067000, 0, "signal";
    SetSignalMask = 0x10068000, 0, "set-signal-mask";
    Explode = 0x10071000, 1, "explode";
    PlaySound = 0x10072000, 1, "play-sound";
    MapCommand = 0x10073000, 2, "map-command";
    SetUnitValue = 0x10082000, 0, "set-unit-value";
    AttachUnit = 0x10083000, 0, "attach-unit";
    DropUnit = 0x10084000, 0, "drop-unit";
}

impl Opcode {
    /// Total encoded width in code words
    pub fn width(self) -> usize {
        1 + self.immediate_count()
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip_table() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_raw(op.raw()), Some(op));
        }
        assert_eq!(Opcode::ALL.len(), 57);
        assert_eq!(Opcode::from_raw(0x10009000), None);
    }

    #[test]
    fn test_widths() {
        assert_eq!(Opcode::MovePieceWithSpeed.width(), 3);
        assert_eq!(Opcode::PushConstant.width(), 2);
        assert_eq!(Opcode::Sleep.width(), 1);
        assert_eq!(Opcode::CallScript.immediate_count(), 2);
        assert_eq!(Opcode::Explode.to_string(), "explode");
    }
}
