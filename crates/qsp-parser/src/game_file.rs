use qsp_core::{BaseActionSource, ErrorKind, GameBundle, LocationSource, QspError};

const GAME_ID: &str = "QSPGAME";
const CODE_SHIFT: u16 = 5;
const MAX_BASE_ACTIONS: usize = 50;
const LEGACY_HEADER_LINES: usize = 30;
const LEGACY_ACTIONS: usize = 20;

fn load_error(message: impl Into<String>) -> QspError {
    QspError::new(ErrorKind::CannotLoadFile, message)
}

/// Decodes a game bundle from file bytes. Accepts the JSON bundle form, the
/// native `QSPGAME` form (UTF-16LE or 8-bit, also the headerless legacy
/// layout) and plain `# name` / `--` delimited source text.
pub fn decode_bundle(bytes: &[u8]) -> Result<GameBundle, QspError> {
    if bytes.is_empty() {
        return Err(load_error("Game file is empty."));
    }
    let units = to_units(bytes);
    let first = units
        .iter()
        .copied()
        .find(|unit| !matches!(*unit, 0xFEFF | 0x20 | 0x09 | 0x0D | 0x0A));
    let bundle = if first == Some(u16::from(b'{')) {
        let text = units_to_string(&units, is_utf16(bytes));
        serde_json::from_str::<GameBundle>(text.trim_start_matches('\u{feff}'))
            .map_err(|error| load_error(format!("Invalid bundle json: {}", error)))?
    } else if first == Some(u16::from(b'#')) {
        decode_source_text(&units_to_string(&units, is_utf16(bytes)))
    } else {
        decode_native(&units, is_utf16(bytes))?
    };
    if bundle.locations.is_empty() {
        return Err(load_error("Game has no locations."));
    }
    Ok(bundle)
}

fn is_utf16(bytes: &[u8]) -> bool {
    bytes.len() > 1 && bytes[1] == 0
}

fn to_units(bytes: &[u8]) -> Vec<u16> {
    if is_utf16(bytes) {
        bytes
            .chunks(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
            .collect()
    } else {
        bytes.iter().map(|byte| u16::from(*byte)).collect()
    }
}

fn units_to_string(units: &[u16], utf16: bool) -> String {
    if utf16 {
        return String::from_utf16_lossy(units);
    }
    let bytes: Vec<u8> = units.iter().map(|unit| *unit as u8).collect();
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => error.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn decode_units(units: &[u16], utf16: bool) -> Vec<u16> {
    let (marker, mask) = if utf16 {
        (0u16.wrapping_sub(CODE_SHIFT), 0xFFFF)
    } else {
        (0u16.wrapping_sub(CODE_SHIFT) & 0xFF, 0xFF)
    };
    units
        .iter()
        .map(|unit| {
            if *unit == marker {
                CODE_SHIFT
            } else {
                unit.wrapping_add(CODE_SHIFT) & mask
            }
        })
        .collect()
}

fn encode_units(units: &[u16], utf16: bool) -> Vec<u16> {
    let (marker, mask) = if utf16 {
        (0u16.wrapping_sub(CODE_SHIFT), 0xFFFF)
    } else {
        (0u16.wrapping_sub(CODE_SHIFT) & 0xFF, 0xFF)
    };
    units
        .iter()
        .map(|unit| {
            if *unit == CODE_SHIFT {
                marker
            } else {
                unit.wrapping_sub(CODE_SHIFT) & mask
            }
        })
        .collect()
}

fn split_fields(units: &[u16]) -> Vec<&[u16]> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut index = 0;
    while index + 1 < units.len() {
        if units[index] == 0x0D && units[index + 1] == 0x0A {
            fields.push(&units[start..index]);
            index += 2;
            start = index;
        } else {
            index += 1;
        }
    }
    let tail = &units[start..];
    if !tail.is_empty() && !(tail.len() == 1 && tail[0] == 0) {
        fields.push(tail);
    }
    fields
}

struct FieldReader<'a> {
    fields: Vec<&'a [u16]>,
    next: usize,
    utf16: bool,
}

impl<'a> FieldReader<'a> {
    fn raw(&mut self) -> Result<String, QspError> {
        let field = self.take()?;
        Ok(units_to_string(field, self.utf16))
    }

    fn coded(&mut self) -> Result<String, QspError> {
        let field = self.take()?;
        Ok(units_to_string(&decode_units(field, self.utf16), self.utf16))
    }

    fn coded_count(&mut self) -> Result<usize, QspError> {
        let text = self.coded()?;
        text.trim()
            .parse::<usize>()
            .map_err(|_| load_error(format!("Invalid count \"{}\".", text)))
    }

    fn take(&mut self) -> Result<&'a [u16], QspError> {
        let field = self
            .fields
            .get(self.next)
            .copied()
            .ok_or_else(|| load_error("Game file is truncated."))?;
        self.next += 1;
        Ok(field)
    }
}

fn decode_native(units: &[u16], utf16: bool) -> Result<GameBundle, QspError> {
    let mut reader = FieldReader {
        fields: split_fields(units),
        next: 0,
        utf16,
    };
    let header = reader.raw()?;
    let legacy = header.trim_start_matches('\u{feff}') != GAME_ID;
    let count = if legacy {
        let count = header
            .trim()
            .parse::<usize>()
            .map_err(|_| load_error("Unknown game file format."))?;
        reader.next = LEGACY_HEADER_LINES;
        count
    } else {
        reader.raw()?;
        reader.coded()?;
        reader.coded_count()?
    };
    if count == 0 {
        return Err(load_error("Game has no locations."));
    }
    let mut locations = Vec::with_capacity(count.min(reader.fields.len()));
    for _ in 0..count {
        let name = reader.coded()?;
        let desc = reader.coded()?;
        let code = reader.coded()?;
        let action_count = if legacy {
            LEGACY_ACTIONS
        } else {
            reader.coded_count()?
        };
        if action_count > MAX_BASE_ACTIONS {
            return Err(load_error(format!(
                "Location \"{}\" declares {} actions.",
                name, action_count
            )));
        }
        let mut actions = Vec::new();
        for _ in 0..action_count {
            let image = if legacy { String::new() } else { reader.coded()? };
            let action_name = reader.coded()?;
            let action_code = reader.coded()?;
            if !action_name.is_empty() {
                actions.push(BaseActionSource {
                    name: action_name,
                    image,
                    code: action_code,
                });
            }
        }
        locations.push(LocationSource {
            name,
            desc,
            code,
            actions,
        });
    }
    Ok(GameBundle { locations })
}

/// Source text form: `# name` opens a location, a line starting with `--` closes it.
fn decode_source_text(text: &str) -> GameBundle {
    let mut locations = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for raw in text.trim_start_matches('\u{feff}').split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.starts_with("--") {
            if let Some((name, body)) = current.take() {
                locations.push(LocationSource {
                    name,
                    code: body.join("\n"),
                    ..LocationSource::default()
                });
            }
            continue;
        }
        match current.as_mut() {
            Some((_, body)) => body.push(line),
            None => {
                if let Some(name) = line.trim_start().strip_prefix('#') {
                    current = Some((name.trim().to_string(), Vec::new()));
                }
            }
        }
    }
    if let Some((name, body)) = current {
        locations.push(LocationSource {
            name,
            code: body.join("\n"),
            ..LocationSource::default()
        });
    }
    GameBundle { locations }
}

/// Writes `bundle` in the native format; line breaks inside fields are kept as `\r\n`.
pub fn encode_game_file(bundle: &GameBundle, utf16: bool) -> Vec<u8> {
    let mut units: Vec<u16> = Vec::new();
    let units_of = |text: &str| -> Vec<u16> {
        if utf16 {
            text.encode_utf16().collect()
        } else {
            text.bytes().map(u16::from).collect()
        }
    };
    let push = |field: Vec<u16>, units: &mut Vec<u16>| {
        units.extend(field);
        units.extend([0x0D, 0x0A]);
    };
    let coded = |text: &str| {
        let normalized = text.replace("\r\n", "\n").replace('\n', "\r\n");
        encode_units(&units_of(&normalized), utf16)
    };
    push(units_of(GAME_ID), &mut units);
    push(units_of(env!("CARGO_PKG_VERSION")), &mut units);
    push(coded("No"), &mut units);
    push(coded(&bundle.locations.len().to_string()), &mut units);
    for location in &bundle.locations {
        push(coded(&location.name), &mut units);
        push(coded(&location.desc), &mut units);
        push(coded(&location.code), &mut units);
        push(coded(&location.actions.len().to_string()), &mut units);
        for action in &location.actions {
            push(coded(&action.image), &mut units);
            push(coded(&action.name), &mut units);
            push(coded(&action.code), &mut units);
        }
    }
    if utf16 {
        units.iter().flat_map(|unit| unit.to_le_bytes()).collect()
    } else {
        units.iter().map(|unit| *unit as u8).collect()
    }
}
