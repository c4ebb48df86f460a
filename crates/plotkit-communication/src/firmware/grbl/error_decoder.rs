//! GRBL error and alarm code descriptions

/// Short description of a GRBL `error:N` code
pub fn describe_error(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse must be at least 3us",
        7 => "EEPROM read failed, defaults restored",
        8 => "'$' command requires Idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line overflow",
        12 => "Step rate exceeds maximum",
        13 => "Safety door opened",
        14 => "Startup line too long",
        15 => "Jog target exceeds machine travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires an integer value",
        24 => "More than one command requires axis words",
        25 => "Repeated word in block",
        26 => "No axis words for command",
        27 => "Line number out of range",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words with G80 active",
        32 => "Arc has no axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing offset word",
        36 => "Unused words in block",
        37 => "Tool length offset axis mismatch",
        38 => "Tool number out of range",
        _ => "Unknown error",
    }
}

/// Short description of a GRBL `ALARM:N` code
pub fn describe_alarm(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered, re-home the machine",
        2 => "Soft limit: target exceeds machine travel",
        3 => "Reset while in motion, position may be lost",
        4 => "Probe not in expected initial state",
        5 => "Probe did not make contact",
        6 => "Homing reset",
        7 => "Door opened during homing",
        8 => "Homing pull-off failed to clear limit switch",
        9 => "Homing could not find limit switch",
        10 => "Limit switch engaged before homing",
        _ => "Unknown alarm",
    }
}

/// `error:N (description)`
pub fn format_error(code: u8) -> String {
    format!("error:{} ({})", code, describe_error(code))
}

/// `ALARM:N (description)`
pub fn format_alarm(code: u8) -> String {
    format!("ALARM:{} ({})", code, describe_alarm(code))
}
