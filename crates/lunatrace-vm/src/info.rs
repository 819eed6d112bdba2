//! Function and frame descriptions: `getinfo` records, short source names
//! and tracebacks.

use crate::callinfo::{CallFrame, CallStack};
use crate::names::{get_func_name, NameWhat};
use lunatrace_core::Function;
use std::fmt::Write;

/// Source reported for native functions.
pub const NATIVE_SOURCE: &str = "=[native]";
/// Short source printed for native frames in a traceback.
pub const NATIVE_SHORT_SRC: &str = "[native]";
/// Flags used when `getinfo` is given none.
pub const DEFAULT_INFO_FLAGS: &str = "flnStu";

const STRING_PREFIX: &str = "[string \"";
const STRING_SUFFIX: &str = "\"]";
const ELLIPSIS: &str = "...";

/// Display form of a chunk's source name, at most `size - 1` characters.
///
/// `=name` is shown verbatim, `@file` keeps the tail of the file name, and
/// any other source is quoted up to its first line.
pub fn format_source_name(source: &str, size: usize) -> String {
    let room = size.saturating_sub(1);
    if let Some(name) = source.strip_prefix('=') {
        return take_chars(name, room).to_string();
    }
    if let Some(file) = source.strip_prefix('@') {
        let len = file.chars().count();
        if len <= room {
            return file.to_string();
        }
        let keep = room.saturating_sub(ELLIPSIS.len());
        return format!("{ELLIPSIS}{}", skip_chars(file, len - keep));
    }

    let room = size.saturating_sub(STRING_PREFIX.len() + ELLIPSIS.len() + STRING_SUFFIX.len() + 1);
    let first_line = source.split('\n').next().unwrap_or_default();
    let mut out = String::from(STRING_PREFIX);
    if first_line.len() == source.len() && source.chars().count() < room {
        out.push_str(source);
    } else {
        out.push_str(take_chars(first_line, room));
        out.push_str(ELLIPSIS);
    }
    out.push_str(STRING_SUFFIX);
    out
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn skip_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

/// What kind of function a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Main,
    Native,
}

impl FunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionKind::Script => "script",
            FunctionKind::Main => "main",
            FunctionKind::Native => "native",
        }
    }
}

/// Which groups of fields a `getinfo` request asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InfoFlags {
    pub source: bool,
    pub current_line: bool,
    pub upvalues: bool,
    pub name: bool,
    pub tail_call: bool,
    pub active_lines: bool,
    pub func: bool,
}

impl InfoFlags {
    /// Parse a flag string such as `"nSl"`. Unknown characters are ignored.
    pub fn parse(what: &str) -> Self {
        let mut flags = InfoFlags::default();
        for ch in what.chars() {
            match ch {
                'S' => flags.source = true,
                'l' => flags.current_line = true,
                'u' => flags.upvalues = true,
                'n' => flags.name = true,
                't' => flags.tail_call = true,
                'L' => flags.active_lines = true,
                'f' => flags.func = true,
                _ => {}
            }
        }
        flags
    }
}

/// The `S` group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub kind: FunctionKind,
    pub source: String,
    pub short_src: String,
    pub line_defined: i64,
    pub last_line_defined: i64,
}

/// The `u` group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpvalueInfo {
    pub nups: usize,
    pub nparams: usize,
    pub is_vararg: bool,
}

/// The `n` group. `name` is `None` and `namewhat` empty when no name was
/// found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallName {
    pub name: Option<String>,
    pub namewhat: &'static str,
}

impl From<Option<NameWhat>> for CallName {
    fn from(nw: Option<NameWhat>) -> Self {
        match nw {
            Some(nw) => CallName {
                name: Some(nw.name),
                namewhat: nw.kind.as_str(),
            },
            None => CallName {
                name: None,
                namewhat: "",
            },
        }
    }
}

/// Result of `getinfo`. Each group is `Some` only if its flag was requested.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebugInfo {
    pub source: Option<SourceInfo>,
    /// -1 when there is no live script frame or its line is unknown.
    pub current_line: Option<i64>,
    pub upvalues: Option<UpvalueInfo>,
    pub name: Option<CallName>,
    pub is_tail_call: Option<bool>,
    /// One line per frame running the function, innermost first; -1 where
    /// the line is unknown.
    pub active_lines: Option<Vec<i64>>,
    pub func: Option<Function>,
}

/// Static description of `func`.
pub fn source_info(func: &Function, source_id_size: usize) -> SourceInfo {
    match func {
        Function::Script(closure) => {
            let p = &closure.proto;
            SourceInfo {
                kind: if p.is_main() {
                    FunctionKind::Main
                } else {
                    FunctionKind::Script
                },
                source: p.source_name().to_string(),
                short_src: format_source_name(p.source_name(), source_id_size),
                line_defined: i64::from(p.line_defined),
                last_line_defined: i64::from(p.last_line_defined),
            }
        }
        Function::Native(native) => SourceInfo {
            kind: FunctionKind::Native,
            source: NATIVE_SOURCE.to_string(),
            short_src: native.name.to_string(),
            line_defined: -1,
            last_line_defined: -1,
        },
    }
}

/// Name under which the frame at `level` was called, resolved from its
/// caller's current instruction. Only script callers can be resolved.
pub fn call_name(callstack: &CallStack, level: usize) -> Option<NameWhat> {
    let caller = callstack.caller_of(level)?;
    get_func_name(caller.proto()?, caller.pc)
}

/// Build a `getinfo` record for `func`, optionally running at `frame`
/// (given with its level).
pub fn aux_getinfo(
    callstack: Option<&CallStack>,
    flags: InfoFlags,
    func: &Function,
    frame: Option<(usize, &CallFrame)>,
    source_id_size: usize,
) -> DebugInfo {
    let mut info = DebugInfo::default();
    if flags.source {
        info.source = Some(source_info(func, source_id_size));
    }
    if flags.current_line {
        let line = frame.and_then(|(_, f)| f.current_line());
        info.current_line = Some(line.map_or(-1, i64::from));
    }
    if flags.upvalues {
        info.upvalues = Some(match func {
            Function::Script(closure) => UpvalueInfo {
                nups: closure.proto.upvalues.len(),
                nparams: usize::from(closure.proto.num_params),
                is_vararg: closure.proto.is_vararg,
            },
            Function::Native(_) => UpvalueInfo {
                nups: 0,
                nparams: 0,
                is_vararg: true,
            },
        });
    }
    if flags.name {
        let nw = match (callstack, frame) {
            (Some(cs), Some((level, _))) => call_name(cs, level),
            _ => None,
        };
        info.name = Some(CallName::from(nw));
    }
    if flags.tail_call {
        info.is_tail_call = Some(false);
    }
    if flags.active_lines {
        let lines = callstack
            .map(|cs| {
                cs.levels()
                    .filter(|(_, f)| f.func.as_ref().is_some_and(|g| g.ptr_eq(func)))
                    .map(|(_, f)| f.current_line().map_or(-1, i64::from))
                    .collect()
            })
            .unwrap_or_default();
        info.active_lines = Some(lines);
    }
    if flags.func {
        info.func = Some(func.clone());
    }
    info
}

/// Multi-line dump of the stack from `level` outward.
pub fn traceback(
    callstack: Option<&CallStack>,
    message: Option<&str>,
    level: i64,
    source_id_size: usize,
) -> String {
    let mut out = String::new();
    if let Some(msg) = message {
        out.push_str(msg);
        out.push('\n');
    }
    out.push_str("stack traceback:");
    if let Some(cs) = callstack {
        let first = usize::try_from(level.max(1)).unwrap_or(1);
        for (lvl, frame) in cs.levels().skip(first - 1) {
            let Some(func) = frame.func.as_ref() else {
                continue;
            };
            let _ = write_frame(&mut out, cs, lvl, frame, func, source_id_size);
        }
    }
    out.push_str("\n\t[native]: in ?");
    out
}

fn write_frame(
    out: &mut String,
    cs: &CallStack,
    level: usize,
    frame: &CallFrame,
    func: &Function,
    source_id_size: usize,
) -> std::fmt::Result {
    let name = call_name(cs, level);
    match func {
        Function::Native(native) => {
            let name = name.map_or_else(|| native.name.to_string(), |nw| nw.name);
            write!(out, "\n\t{NATIVE_SHORT_SRC}: in function '{name}'")
        }
        Function::Script(closure) => {
            let p = &closure.proto;
            let short_src = format_source_name(p.source_name(), source_id_size);
            write!(out, "\n\t{short_src}:")?;
            if let Some(line) = frame.current_line() {
                write!(out, "{line}:")?;
            }
            out.push_str(" in ");
            if p.is_main() {
                out.push_str("main chunk");
                Ok(())
            } else if let Some(nw) = name {
                write!(out, "function '{}'", nw.name)
            } else {
                write!(out, "function <{short_src}:{}>", p.line_defined)
            }
        }
    }
}
