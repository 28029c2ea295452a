pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const CONFIG_ERROR: i32 = 3;
pub const SERVICE_ERROR: i32 = 4;
pub const NOT_REPLAYABLE: i32 = 5;
