//! A small pickle virtual machine.
//!
//! Only the subset of opcodes produced by `pickle.dump` for numpy arrays, scipy
//! sparse matrices and (default)dicts of lists is implemented, for protocols 0
//! to 5. Class instantiation is never performed: `REDUCE`, `NEWOBJ` and `BUILD`
//! produce an [`Object`] recording the callable, its arguments and the state,
//! which [`super::raw`] interprets.
use std::{borrow::Cow, collections::HashMap, io::Read, path::Path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PickleError {
    #[error("unexpected end of pickle stream")]
    Eof,
    #[error("unsupported opcode 0x{opcode:02x} at offset {offset}")]
    UnsupportedOpcode { opcode: u8, offset: usize },
    #[error("stack underflow at offset {0}")]
    StackUnderflow(usize),
    #[error("no mark on the stack at offset {0}")]
    MissingMark(usize),
    #[error("memo key {0} not found")]
    MissingMemo(u32),
    #[error("invalid pickle: {0}")]
    Invalid(String),
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, PickleError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Python 3 `str`, or a Python 2 `str` decoded as latin-1.
    String(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Global { module: String, name: String },
    Object(Box<Object>),
    /// Only present while the machine runs; [`from_slice`] resolves every reference.
    MemoRef(u32),
}

/// The result of `REDUCE`/`NEWOBJ`, plus whatever `BUILD`, `SETITEMS` and
/// `APPENDS` applied to it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub callable: Value,
    pub args: Vec<Value>,
    pub state: Option<Value>,
    pub items: Vec<(Value, Value)>,
    pub elements: Vec<Value>,
}

impl Object {
    fn new(callable: Value, args: Vec<Value>) -> Self {
        Self {
            callable,
            args,
            state: None,
            items: Vec::new(),
            elements: Vec::new(),
        }
    }

    /// The class this object stands for. `copy_reg._reconstructor(cls, ...)` and
    /// `numpy.core.multiarray._reconstruct(cls, ...)` are seen through.
    pub fn class(&self) -> Option<(&str, &str)> {
        match &self.callable {
            Value::Global { module, name } if is_reconstructor(module, name) => {
                match self.args.first() {
                    Some(Value::Global { module, name }) => Some((module.as_str(), name.as_str())),
                    _ => None,
                }
            }
            Value::Global { module, name } => Some((module.as_str(), name.as_str())),
            _ => None,
        }
    }
}

fn is_reconstructor(module: &str, name: &str) -> bool {
    matches!(
        (module, name),
        ("copy_reg", "_reconstructor") | ("copyreg", "_reconstructor")
    ) || (module.starts_with("numpy") && name == "_reconstruct")
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes of a `bytes` value, or of a latin-1 decoded Python 2 `str`.
    pub fn as_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Self::Bytes(b) => Some(Cow::Borrowed(b)),
            Self::String(s) => s
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect::<Option<Vec<u8>>>()
                .map(Cow::Owned),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(v) | Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Look up a string key in a dict.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Dict(items) => items
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::None => "None".to_owned(),
            Self::Bool(_) => "bool".to_owned(),
            Self::Int(_) => "int".to_owned(),
            Self::Float(_) => "float".to_owned(),
            Self::String(_) => "str".to_owned(),
            Self::Bytes(_) => "bytes".to_owned(),
            Self::Tuple(v) => format!("tuple of {}", v.len()),
            Self::List(v) => format!("list of {}", v.len()),
            Self::Dict(v) => format!("dict of {}", v.len()),
            Self::Global { module, name } => format!("global {module}.{name}"),
            Self::Object(obj) => match obj.class() {
                Some((module, name)) => format!("{module}.{name} instance"),
                None => "object".to_owned(),
            },
            Self::MemoRef(id) => format!("memo reference {id}"),
        }
    }
}

mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const DUP: u8 = b'2';
    pub const FLOAT: u8 = b'F';
    pub const INT: u8 = b'I';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const LONG: u8 = b'L';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
    pub const BINUNICODE: u8 = b'X';
    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';
    pub const REDUCE: u8 = b'R';
    pub const APPEND: u8 = b'a';
    pub const BUILD: u8 = b'b';
    pub const GLOBAL: u8 = b'c';
    pub const DICT: u8 = b'd';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPENDS: u8 = b'e';
    pub const GET: u8 = b'g';
    pub const BINGET: u8 = b'h';
    pub const LONG_BINGET: u8 = b'j';
    pub const LIST: u8 = b'l';
    pub const EMPTY_LIST: u8 = b']';
    pub const PUT: u8 = b'p';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const SETITEM: u8 = b's';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';
    pub const PROTO: u8 = 0x80;
    pub const NEWOBJ: u8 = 0x81;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const LONG4: u8 = 0x8b;
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const EMPTY_SET: u8 = 0x8f;
    pub const ADDITEMS: u8 = 0x90;
    pub const FROZENSET: u8 = 0x91;
    pub const NEWOBJ_EX: u8 = 0x92;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
    pub const BYTEARRAY8: u8 = 0x96;
}

// nesting depth beyond which a structure is treated as recursive
const MAX_DEPTH: usize = 512;

pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Value> {
    from_slice(&std::fs::read(path)?)
}

pub fn from_reader<R: Read>(mut reader: R) -> Result<Value> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    from_slice(&buf)
}

pub fn from_slice(data: &[u8]) -> Result<Value> {
    Machine {
        data,
        pos: 0,
        stack: Vec::new(),
        marks: Vec::new(),
        memo: HashMap::new(),
    }
    .run()
}

struct Machine<'a> {
    data: &'a [u8],
    pos: usize,
    stack: Vec<Value>,
    marks: Vec<usize>,
    memo: HashMap<u32, Value>,
}

impl<'a> Machine<'a> {
    fn run(mut self) -> Result<Value> {
        loop {
            let offset = self.pos;
            let opcode = self.read_u8()?;
            match opcode {
                op::PROTO => {
                    self.read_u8()?;
                }
                op::FRAME => {
                    self.take(8)?;
                }
                op::STOP => {
                    let value = self.pop(offset)?;
                    return self.resolve(value, 0);
                }
                op::MARK => self.marks.push(self.stack.len()),
                op::POP => {
                    self.pop(offset)?;
                }
                op::POP_MARK => {
                    self.pop_mark(offset)?;
                }
                op::DUP => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(PickleError::StackUnderflow(offset))?;
                    self.stack.push(top);
                }

                op::NONE => self.stack.push(Value::None),
                op::NEWTRUE => self.stack.push(Value::Bool(true)),
                op::NEWFALSE => self.stack.push(Value::Bool(false)),
                op::INT => {
                    let line = self.read_line()?;
                    let value = match line {
                        "00" => Value::Bool(false),
                        "01" => Value::Bool(true),
                        _ => Value::Int(parse_text(line)?),
                    };
                    self.stack.push(value);
                }
                op::LONG => {
                    let line = self.read_line()?;
                    let value = parse_text(line.trim_end_matches('L'))?;
                    self.stack.push(Value::Int(value));
                }
                op::BININT => {
                    let b = self.take(4)?;
                    let value = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    self.stack.push(Value::Int(value as i64));
                }
                op::BININT1 => {
                    let value = self.read_u8()?;
                    self.stack.push(Value::Int(value as i64));
                }
                op::BININT2 => {
                    let b = self.take(2)?;
                    self.stack
                        .push(Value::Int(u16::from_le_bytes([b[0], b[1]]) as i64));
                }
                op::LONG1 => {
                    let len = self.read_u8()? as usize;
                    let value = decode_long(self.take(len)?)?;
                    self.stack.push(Value::Int(value));
                }
                op::LONG4 => {
                    let len = self.read_len(4)?;
                    let value = decode_long(self.take(len)?)?;
                    self.stack.push(Value::Int(value));
                }
                op::FLOAT => {
                    let line = self.read_line()?;
                    let value = line
                        .parse::<f64>()
                        .map_err(|e| PickleError::Invalid(format!("float {line:?}: {e}")))?;
                    self.stack.push(Value::Float(value));
                }
                op::BINFLOAT => {
                    let b = self.take(8)?;
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(b);
                    self.stack.push(Value::Float(f64::from_be_bytes(buf)));
                }

                op::BINSTRING => {
                    let len = self.read_len(4)?;
                    let s = latin1(self.take(len)?);
                    self.stack.push(Value::String(s));
                }
                op::SHORT_BINSTRING => {
                    let len = self.read_u8()? as usize;
                    let s = latin1(self.take(len)?);
                    self.stack.push(Value::String(s));
                }
                op::BINUNICODE | op::SHORT_BINUNICODE | op::BINUNICODE8 => {
                    let len = match opcode {
                        op::SHORT_BINUNICODE => self.read_u8()? as usize,
                        op::BINUNICODE => self.read_len(4)?,
                        _ => self.read_len(8)?,
                    };
                    let s = std::str::from_utf8(self.take(len)?)
                        .map_err(|e| PickleError::Invalid(format!("unicode: {e}")))?;
                    self.stack.push(Value::String(s.to_owned()));
                }
                op::BINBYTES | op::SHORT_BINBYTES | op::BINBYTES8 | op::BYTEARRAY8 => {
                    let len = match opcode {
                        op::SHORT_BINBYTES => self.read_u8()? as usize,
                        op::BINBYTES => self.read_len(4)?,
                        _ => self.read_len(8)?,
                    };
                    let b = self.take(len)?.to_vec();
                    self.stack.push(Value::Bytes(b));
                }

                op::EMPTY_TUPLE => self.stack.push(Value::Tuple(Vec::new())),
                op::TUPLE => {
                    let items = self.pop_mark(offset)?;
                    self.stack.push(Value::Tuple(items));
                }
                op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                    let n = (opcode - op::TUPLE1 + 1) as usize;
                    if self.stack.len() < n {
                        return Err(PickleError::StackUnderflow(offset));
                    }
                    let items = self.stack.split_off(self.stack.len() - n);
                    self.stack.push(Value::Tuple(items));
                }

                op::EMPTY_LIST | op::EMPTY_SET => self.stack.push(Value::List(Vec::new())),
                op::LIST | op::FROZENSET => {
                    let items = self.pop_mark(offset)?;
                    self.stack.push(Value::List(items));
                }
                op::APPEND => {
                    let item = self.pop(offset)?;
                    self.extend(vec![item], offset)?;
                }
                op::APPENDS | op::ADDITEMS => {
                    let items = self.pop_mark(offset)?;
                    self.extend(items, offset)?;
                }

                op::EMPTY_DICT => self.stack.push(Value::Dict(Vec::new())),
                op::DICT => {
                    let items = self.pop_mark(offset)?;
                    self.stack.push(Value::Dict(pairs(items, offset)?));
                }
                op::SETITEM => {
                    let value = self.pop(offset)?;
                    let key = self.pop(offset)?;
                    self.set_items(vec![(key, value)], offset)?;
                }
                op::SETITEMS => {
                    let items = self.pop_mark(offset)?;
                    self.set_items(pairs(items, offset)?, offset)?;
                }

                op::GLOBAL => {
                    let module = self.read_line()?.to_owned();
                    let name = self.read_line()?.to_owned();
                    self.stack.push(Value::Global { module, name });
                }
                op::STACK_GLOBAL => {
                    let name = self.pop_string(offset)?;
                    let module = self.pop_string(offset)?;
                    self.stack.push(Value::Global { module, name });
                }
                op::REDUCE | op::NEWOBJ => {
                    let args = self.pop(offset)?;
                    let args = self.pop_tuple(args)?;
                    let callable = self.pop(offset)?;
                    let callable = self.deref(callable)?;
                    self.stack
                        .push(Value::Object(Box::new(Object::new(callable, args))));
                }
                op::NEWOBJ_EX => {
                    self.pop(offset)?; // kwargs
                    let args = self.pop(offset)?;
                    let args = self.pop_tuple(args)?;
                    let callable = self.pop(offset)?;
                    let callable = self.deref(callable)?;
                    self.stack
                        .push(Value::Object(Box::new(Object::new(callable, args))));
                }
                op::BUILD => {
                    let state = self.pop(offset)?;
                    self.build(state, offset)?;
                }

                op::PUT => {
                    let id = parse_text(self.read_line()?)?;
                    self.memoize(memo_id(id)?, offset)?;
                }
                op::BINPUT => {
                    let id = self.read_u8()? as u32;
                    self.memoize(id, offset)?;
                }
                op::LONG_BINPUT => {
                    let id = self.read_len(4)? as u32;
                    self.memoize(id, offset)?;
                }
                op::MEMOIZE => {
                    let id = self.memo.len() as u32;
                    self.memoize(id, offset)?;
                }
                op::GET => {
                    let id = parse_text(self.read_line()?)?;
                    self.recall(memo_id(id)?)?;
                }
                op::BINGET => {
                    let id = self.read_u8()? as u32;
                    self.recall(id)?;
                }
                op::LONG_BINGET => {
                    let id = self.read_len(4)? as u32;
                    self.recall(id)?;
                }

                _ => return Err(PickleError::UnsupportedOpcode { opcode, offset }),
            }
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(PickleError::Eof)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let data = self.data;
        let end = self.pos.checked_add(n).ok_or(PickleError::Eof)?;
        let bytes = data.get(self.pos..end).ok_or(PickleError::Eof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_len(&mut self, width: usize) -> Result<usize> {
        let b = self.take(width)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(b);
        usize::try_from(u64::from_le_bytes(buf))
            .map_err(|_| PickleError::Invalid("length does not fit in memory".to_owned()))
    }

    fn read_line(&mut self) -> Result<&'a str> {
        let data = self.data;
        let rest = data.get(self.pos..).ok_or(PickleError::Eof)?;
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(PickleError::Eof)?;
        self.pos += len + 1;
        std::str::from_utf8(&rest[..len])
            .map(|s| s.trim_end_matches('\r'))
            .map_err(|e| PickleError::Invalid(format!("text argument: {e}")))
    }

    fn pop(&mut self, offset: usize) -> Result<Value> {
        self.stack.pop().ok_or(PickleError::StackUnderflow(offset))
    }

    fn pop_mark(&mut self, offset: usize) -> Result<Vec<Value>> {
        let mark = self.marks.pop().ok_or(PickleError::MissingMark(offset))?;
        if mark > self.stack.len() {
            return Err(PickleError::StackUnderflow(offset));
        }
        Ok(self.stack.split_off(mark))
    }

    fn pop_string(&mut self, offset: usize) -> Result<String> {
        let value = self.pop(offset)?;
        match self.deref(value)? {
            Value::String(s) => Ok(s),
            other => Err(PickleError::Unexpected {
                expected: "str",
                found: other.describe(),
            }),
        }
    }

    fn pop_tuple(&self, value: Value) -> Result<Vec<Value>> {
        match self.deref(value)? {
            Value::Tuple(items) => Ok(items),
            other => Err(PickleError::Unexpected {
                expected: "argument tuple",
                found: other.describe(),
            }),
        }
    }

    fn memoize(&mut self, id: u32, offset: usize) -> Result<()> {
        let top = self.pop(offset)?;
        match top {
            Value::MemoRef(target) if target == id => {}
            Value::MemoRef(_) => {
                self.memo.insert(id, top.clone());
            }
            value => {
                self.memo.insert(id, value);
            }
        }
        self.stack.push(Value::MemoRef(id));
        Ok(())
    }

    fn recall(&mut self, id: u32) -> Result<()> {
        if !self.memo.contains_key(&id) {
            return Err(PickleError::MissingMemo(id));
        }
        self.stack.push(Value::MemoRef(id));
        Ok(())
    }

    /// The top of the stack, following memo references so that mutations are
    /// visible through every reference.
    fn top_mut(&mut self, offset: usize) -> Result<&mut Value> {
        let memo_id = match self.stack.last() {
            None => return Err(PickleError::StackUnderflow(offset)),
            Some(Value::MemoRef(id)) => Some(*id),
            Some(_) => None,
        };
        let Some(mut id) = memo_id else {
            return self
                .stack
                .last_mut()
                .ok_or(PickleError::StackUnderflow(offset));
        };
        let mut target = None;
        for _ in 0..=self.memo.len() {
            match self.memo.get(&id) {
                Some(Value::MemoRef(next)) => id = *next,
                Some(_) => {
                    target = Some(id);
                    break;
                }
                None => return Err(PickleError::MissingMemo(id)),
            }
        }
        let id = target.ok_or_else(|| PickleError::Invalid("cyclic memo".to_owned()))?;
        self.memo.get_mut(&id).ok_or(PickleError::MissingMemo(id))
    }

    fn extend(&mut self, items: Vec<Value>, offset: usize) -> Result<()> {
        match self.top_mut(offset)? {
            Value::List(list) => list.extend(items),
            Value::Object(obj) => obj.elements.extend(items),
            other => {
                return Err(PickleError::Unexpected {
                    expected: "list",
                    found: other.describe(),
                })
            }
        }
        Ok(())
    }

    fn set_items(&mut self, items: Vec<(Value, Value)>, offset: usize) -> Result<()> {
        match self.top_mut(offset)? {
            Value::Dict(dict) => dict.extend(items),
            Value::Object(obj) => obj.items.extend(items),
            other => {
                return Err(PickleError::Unexpected {
                    expected: "dict",
                    found: other.describe(),
                })
            }
        }
        Ok(())
    }

    fn build(&mut self, state: Value, offset: usize) -> Result<()> {
        let state = self.deref(state)?;
        match self.top_mut(offset)? {
            Value::Object(obj) => obj.state = Some(state),
            Value::Dict(dict) => match state {
                Value::Dict(items) => dict.extend(items),
                other => {
                    return Err(PickleError::Unexpected {
                        expected: "dict state",
                        found: other.describe(),
                    })
                }
            },
            other => {
                return Err(PickleError::Unexpected {
                    expected: "object",
                    found: other.describe(),
                })
            }
        }
        Ok(())
    }

    fn deref(&self, value: Value) -> Result<Value> {
        let mut value = value;
        for _ in 0..=self.memo.len() {
            match value {
                Value::MemoRef(id) => {
                    value = self
                        .memo
                        .get(&id)
                        .cloned()
                        .ok_or(PickleError::MissingMemo(id))?;
                }
                value => return Ok(value),
            }
        }
        Err(PickleError::Invalid("cyclic memo".to_owned()))
    }

    fn resolve(&self, value: Value, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(PickleError::Invalid("recursive structure".to_owned()));
        }
        let resolve_all = |items: Vec<Value>| {
            items
                .into_iter()
                .map(|v| self.resolve(v, depth + 1))
                .collect::<Result<Vec<_>>>()
        };
        let resolve_pairs = |items: Vec<(Value, Value)>| {
            items
                .into_iter()
                .map(|(k, v)| -> Result<(Value, Value)> {
                    Ok((self.resolve(k, depth + 1)?, self.resolve(v, depth + 1)?))
                })
                .collect::<Result<Vec<_>>>()
        };
        Ok(match value {
            Value::MemoRef(id) => self.resolve(self.deref(Value::MemoRef(id))?, depth + 1)?,
            Value::Tuple(items) => Value::Tuple(resolve_all(items)?),
            Value::List(items) => Value::List(resolve_all(items)?),
            Value::Dict(items) => Value::Dict(resolve_pairs(items)?),
            Value::Object(obj) => {
                let Object {
                    callable,
                    args,
                    state,
                    items,
                    elements,
                } = *obj;
                Value::Object(Box::new(Object {
                    callable: self.resolve(callable, depth + 1)?,
                    args: resolve_all(args)?,
                    state: state.map(|s| self.resolve(s, depth + 1)).transpose()?,
                    items: resolve_pairs(items)?,
                    elements: resolve_all(elements)?,
                }))
            }
            value => value,
        })
    }
}

fn pairs(items: Vec<Value>, offset: usize) -> Result<Vec<(Value, Value)>> {
    if items.len() % 2 != 0 {
        return Err(PickleError::Invalid(format!(
            "odd number of dict items at offset {offset}"
        )));
    }
    let mut iter = items.into_iter();
    let mut out = Vec::new();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        out.push((k, v));
    }
    Ok(out)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn parse_text(line: &str) -> Result<i64> {
    line.parse::<i64>()
        .map_err(|e| PickleError::Invalid(format!("integer {line:?}: {e}")))
}

fn memo_id(id: i64) -> Result<u32> {
    u32::try_from(id).map_err(|_| PickleError::Invalid(format!("memo key {id}")))
}

/// Little-endian two's complement, as written by `LONG1`/`LONG4`.
fn decode_long(bytes: &[u8]) -> Result<i64> {
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    if bytes.len() > 8 {
        return Err(PickleError::Invalid(
            "integer wider than 64 bits".to_owned(),
        ));
    }
    let mut buf = if last & 0x80 != 0 { [0xff; 8] } else { [0; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_of_lists_protocol_2() {
        // pickle.dumps({1: [2, 3], 2: [1]}, protocol=2)
        let data = b"\x80\x02}q\x00(K\x01]q\x01(K\x02K\x03eK\x02]q\x02K\x01au.";
        let value = from_slice(data).unwrap();
        assert_eq!(
            value,
            Value::Dict(vec![
                (
                    Value::Int(1),
                    Value::List(vec![Value::Int(2), Value::Int(3)])
                ),
                (Value::Int(2), Value::List(vec![Value::Int(1)])),
            ])
        );
    }

    #[test]
    fn defaultdict_protocol_4() {
        // pickle.dumps(defaultdict(list, {0: [1]}), protocol=4), without framing
        let data = b"\x80\x04\x8c\x0bcollections\x94\x8c\x0bdefaultdict\x94\x93\x94\
                     \x8c\x08builtins\x94\x8c\x04list\x94\x93\x94\x85\x94R\x94\
                     K\x00]\x94K\x01as.";
        let value = from_slice(data).unwrap();
        let Value::Object(obj) = value else {
            panic!("expected an object, got {value:?}");
        };
        assert_eq!(obj.class(), Some(("collections", "defaultdict")));
        assert_eq!(
            obj.items,
            vec![(Value::Int(0), Value::List(vec![Value::Int(1)]))]
        );
    }

    #[test]
    fn memo_references_see_later_mutations() {
        // a = []; pickle.dumps((a, a), protocol=2) with the append after the get
        let data = b"\x80\x02]q\x00h\x00\x86q\x01.";
        let value = from_slice(data).unwrap();
        assert_eq!(
            value,
            Value::Tuple(vec![Value::List(vec![]), Value::List(vec![])])
        );

        let data = b"\x80\x02(]q\x00h\x00K\x07atq\x01.";
        let value = from_slice(data).unwrap();
        assert_eq!(
            value,
            Value::Tuple(vec![
                Value::List(vec![Value::Int(7)]),
                Value::List(vec![Value::Int(7)]),
            ])
        );
    }

    #[test]
    fn python2_str_is_latin1() {
        let data = b"\x80\x02U\x03\x00\xff\x10q\x00.";
        let value = from_slice(data).unwrap();
        assert_eq!(value.as_bytes().unwrap().as_ref(), &[0x00, 0xff, 0x10]);
    }

    #[test]
    fn integers() {
        assert_eq!(decode_long(&[]).unwrap(), 0);
        assert_eq!(decode_long(&[0xff]).unwrap(), -1);
        assert_eq!(decode_long(&[0x00, 0x01]).unwrap(), 256);
        assert_eq!(from_slice(b"J\xfe\xff\xff\xff.").unwrap(), Value::Int(-2));
        assert_eq!(from_slice(b"I01\n.").unwrap(), Value::Bool(true));
        assert_eq!(from_slice(b"L12345L\n.").unwrap(), Value::Int(12345));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        assert!(matches!(from_slice(b"\x80\x02]q"), Err(PickleError::Eof)));
        assert!(matches!(
            from_slice(b"\x80\x02\xff"),
            Err(PickleError::UnsupportedOpcode { opcode: 0xff, .. })
        ));
    }
}
