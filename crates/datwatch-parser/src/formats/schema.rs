pub const LR_FRAME_COLUMNS: [&str; 4] = ["timestamp", "offset_s", "lr", "lr_raw"];

pub const EPIC_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.6f";

pub const FIELD_SEPARATOR: char = '\t';
