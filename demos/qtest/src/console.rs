use crate::alloc::FaultyAlloc;
use anyhow::{Result, anyhow, bail};
use std::io::Write;
use std::str::FromStr;
use strqueue::{Queue, handle};

/// Maximum number of elements printed by `show`.
const SHOW_LIMIT: usize = 50;

const HELP: &str = "\
Commands:
  new                  create a new queue, destroying the current one
  free                 destroy the current queue
  ih <str|RAND> [n]    insert at head n times
  it <str|RAND> [n]    insert at tail n times
  rh [str]             remove from head, optionally comparing with str
  rhq                  remove from head without reporting the value
  size [n]             compute the queue size n times
  reverse              reverse the queue in place
  sort                 sort the queue in ascending order
  show                 print the queue contents
  option fail <pct>    set the allocation failure probability
  option length <n>    set the buffer length used by rh
  help                 print this message
  quit                 exit";

#[derive(Debug, PartialEq, Eq)]
pub enum Value {
    Literal(String),
    Random,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    New,
    Free,
    InsertHead(Value, usize),
    InsertTail(Value, usize),
    RemoveHead(Option<String>),
    RemoveHeadQuiet,
    Size(usize),
    Reverse,
    Sort,
    Show,
    FailPercent(u32),
    Length(usize),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut args = s.split_whitespace();
        let Some(name) = args.next() else {
            bail!("empty command");
        };
        let args = args.collect::<Vec<_>>();
        let count = |i: usize| -> Result<usize> {
            args.get(i).map_or(Ok(1), |n| {
                n.parse()
                    .map_err(|e| anyhow!("invalid count {n:?}: {e}"))
            })
        };
        let value = || -> Result<Value> {
            match args.first() {
                Some(&"RAND") => Ok(Value::Random),
                Some(s) => Ok(Value::Literal(s.to_string())),
                None => Err(anyhow!("{name} requires a value")),
            }
        };
        let max_args = match name {
            "new" | "free" | "rhq" | "reverse" | "sort" | "show" | "help" | "quit" => 0,
            "rh" | "size" => 1,
            _ => 2,
        };
        if args.len() > max_args {
            bail!("too many arguments for {name}");
        }

        let cmd = match name {
            "new" => Self::New,
            "free" => Self::Free,
            "ih" => Self::InsertHead(value()?, count(1)?),
            "it" => Self::InsertTail(value()?, count(1)?),
            "rh" => Self::RemoveHead(args.first().map(|s| s.to_string())),
            "rhq" => Self::RemoveHeadQuiet,
            "size" => Self::Size(count(0)?),
            "reverse" => Self::Reverse,
            "sort" => Self::Sort,
            "show" => Self::Show,
            "option" => {
                let (Some(key), Some(val)) = (args.first(), args.get(1)) else {
                    bail!("usage: option <fail|length> <value>");
                };
                match *key {
                    "fail" => Self::FailPercent(
                        val.parse()
                            .map_err(|e| anyhow!("invalid percent {val:?}: {e}"))?,
                    ),
                    "length" => Self::Length(
                        val.parse()
                            .map_err(|e| anyhow!("invalid length {val:?}: {e}"))?,
                    ),
                    _ => bail!("unknown option {key:?}"),
                }
            },
            "help" => Self::Help,
            "quit" => Self::Quit,
            _ => bail!("unknown command {name:?}"),
        };
        Ok(cmd)
    }
}

pub enum Flow {
    Continue,
    Quit,
}

/// Drives a single queue handle from textual commands.
pub struct Console<'a, W> {
    queue: Option<Box<Queue>>,
    alloc: &'a FaultyAlloc,
    length: usize,
    rng: fastrand::Rng,
    errors: usize,
    out: W,
}

impl<'a, W: Write> Console<'a, W> {
    pub fn new(alloc: &'a FaultyAlloc, length: usize, seed: u64, out: W) -> Self {
        Self {
            queue: None,
            alloc,
            length,
            rng: fastrand::Rng::with_seed(seed),
            errors: 0,
            out,
        }
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Parses and executes one line, counting any failure as an error.
    pub fn run_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Flow::Continue;
        }
        match line.parse().and_then(|cmd| self.execute(cmd)) {
            Ok(flow) => flow,
            Err(e) => {
                self.errors += 1;
                tracing::error!("{line}: {e:#}");
                Flow::Continue
            },
        }
    }

    pub fn execute(&mut self, cmd: Command) -> Result<Flow> {
        match cmd {
            Command::New => {
                handle::destroy(self.queue.take());
                let queue = {
                    let _armed = self.alloc.arm();
                    handle::create()
                };
                self.queue = Some(queue?);
                self.show()?;
            },
            Command::Free => {
                handle::destroy(self.queue.take());
                self.show()?;
            },
            Command::InsertHead(value, count) => {
                self.insert(&value, count, handle::insert_head)?;
                self.show()?;
            },
            Command::InsertTail(value, count) => {
                self.insert(&value, count, handle::insert_tail)?;
                self.show()?;
            },
            Command::RemoveHead(expected) => {
                let mut buf = vec![0u8; self.length];
                if !handle::remove_head(self.queue.as_deref_mut(), Some(&mut buf[..]))? {
                    bail!("removal from an empty queue");
                }
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                let removed = String::from_utf8_lossy(&buf[..end]);
                writeln!(self.out, "Removed {removed} from queue")?;
                if let Some(expected) = expected
                    && removed != expected
                {
                    bail!("removed value {removed:?} does not match {expected:?}");
                }
                self.show()?;
            },
            Command::RemoveHeadQuiet => {
                if !handle::remove_head(self.queue.as_deref_mut(), None)? {
                    bail!("removal from an empty queue");
                }
                self.show()?;
            },
            Command::Size(repeat) => {
                self.warn_if_absent("size");
                let mut size = 0;
                for _ in 0..repeat {
                    size = handle::size(self.queue.as_deref());
                }
                writeln!(self.out, "Queue size = {size}")?;
                self.show()?;
            },
            Command::Reverse => {
                self.warn_if_absent("reverse");
                handle::reverse(self.queue.as_deref_mut());
                self.show()?;
            },
            Command::Sort => {
                self.warn_if_absent("sort");
                handle::sort(self.queue.as_deref_mut());
                self.check_sorted()?;
                self.show()?;
            },
            Command::Show => self.show()?,
            Command::FailPercent(percent) => {
                self.alloc.set_fail_percent(percent);
                let percent = self.alloc.fail_percent();
                writeln!(self.out, "Allocation failure probability = {percent}%")?;
            },
            Command::Length(length) => self.length = length,
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn insert(
        &mut self,
        value: &Value,
        count: usize,
        op: fn(Option<&mut Queue>, &str) -> strqueue::Result<()>,
    ) -> Result<()> {
        for _ in 0..count {
            let s = match value {
                Value::Literal(s) => s.clone(),
                Value::Random => self.random_string(),
            };
            // Nothing else may allocate while armed.
            let res = {
                let _armed = self.alloc.arm();
                op(self.queue.as_deref_mut(), &s)
            };
            res.map_err(|e| anyhow!("insertion of {s:?} failed: {e}"))?;
        }
        Ok(())
    }

    fn random_string(&mut self) -> String {
        let len = self.rng.usize(5..=10);
        std::iter::repeat_with(|| self.rng.lowercase())
            .take(len)
            .collect()
    }

    fn warn_if_absent(&self, op: &str) {
        if self.queue.is_none() {
            tracing::warn!("calling {op} on an absent queue");
        }
    }

    fn check_sorted(&self) -> Result<()> {
        let Some(q) = self.queue.as_deref() else {
            return Ok(());
        };
        let mut prev: Option<&str> = None;
        for s in q {
            if prev.is_some_and(|p| p > s) {
                bail!("queue is not sorted, {prev:?} precedes {s:?}");
            }
            prev = Some(s);
        }
        Ok(())
    }

    fn show(&mut self) -> Result<()> {
        let Some(q) = self.queue.as_deref() else {
            writeln!(self.out, "q = NULL")?;
            return Ok(());
        };
        write!(self.out, "q = [")?;
        for (i, s) in q.iter().take(SHOW_LIMIT).enumerate() {
            if i > 0 {
                write!(self.out, " ")?;
            }
            write!(self.out, "{s}")?;
        }
        if q.len() > SHOW_LIMIT {
            write!(self.out, " ...")?;
        }
        writeln!(self.out, "]")?;
        Ok(())
    }
}
