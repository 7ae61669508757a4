use std::io::{self, BufRead, BufReader, Read};
use std::process::Child;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::error::{BootError, Result};

type Line = Result<String>;

#[derive(Debug)]
pub enum Recv {
    /// A full line including its terminator, or the unterminated tail of
    /// what the pipe had available (a prompt, typically).
    Line(String),
    Error(BootError),
    Idle,
    /// All pipes at EOF.
    Closed,
}

/// stdout and stderr of a child, merged line by line.
pub struct Console {
    rx: Receiver<Line>,
}

impl Console {
    pub fn from_readers<I>(readers: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = (&'static str, Box<dyn Read + Send>)>,
    {
        let (tx, rx) = mpsc::channel();
        for (name, reader) in readers {
            let tx = tx.clone();
            thread::Builder::new()
                .name(format!("console-{}", name))
                .spawn(move || forward(name, reader, tx))?;
        }
        Ok(Self { rx })
    }

    pub fn from_child(child: &mut Child) -> io::Result<Self> {
        let mut readers: Vec<(&'static str, Box<dyn Read + Send>)> = vec![];
        if let Some(stdout) = child.stdout.take() {
            readers.push(("stdout", Box::new(stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(("stderr", Box::new(stderr)));
        }
        Self::from_readers(readers)
    }

    pub fn next_line(&self, timeout: Duration) -> Recv {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(line)) => Recv::Line(line),
            Ok(Err(e)) => Recv::Error(e),
            Err(RecvTimeoutError::Timeout) => Recv::Idle,
            Err(RecvTimeoutError::Disconnected) => {
                // A closed stream still costs one poll interval.
                thread::sleep(timeout);
                Recv::Closed
            }
        }
    }
}

fn forward(name: &str, reader: Box<dyn Read + Send>, tx: Sender<Line>) {
    let mut reader = BufReader::new(reader);
    let mut pending = Vec::new();
    loop {
        let (used, complete) = match reader.fill_buf() {
            Ok([]) => break,
            Ok(chunk) => match chunk.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    pending.extend_from_slice(&chunk[..=i]);
                    (i + 1, true)
                }
                None => {
                    pending.extend_from_slice(chunk);
                    (chunk.len(), false)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(BootError::Read(e)));
                break;
            }
        };
        reader.consume(used);
        trace!("{}: {} bytes", name, used);

        // Prompts are not newline terminated, so an unterminated read is
        // handed over as is.
        let line = if complete {
            Some(decode(std::mem::take(&mut pending)))
        } else {
            split_partial(&mut pending)
        };
        if let Some(line) = line {
            if tx.send(line).is_err() {
                return;
            }
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(decode(pending));
    }
    debug!("{} closed", name);
}

fn decode(bytes: Vec<u8>) -> Line {
    String::from_utf8(bytes).map_err(BootError::from)
}

/// Takes the decodable prefix of `pending`, leaving a truncated trailing
/// UTF-8 sequence behind for the next read.
fn split_partial(pending: &mut Vec<u8>) -> Option<Line> {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => pending.len(),
    };
    if valid == 0 {
        return None;
    }
    let rest = pending.split_off(valid);
    Some(decode(std::mem::replace(pending, rest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const WAIT: Duration = Duration::from_secs(5);

    fn console(name: &'static str, bytes: &'static [u8]) -> Console {
        let reader: Box<dyn Read + Send> = Box::new(Cursor::new(bytes));
        Console::from_readers(vec![(name, reader)]).unwrap()
    }

    #[test]
    fn yields_lines_in_order_then_closes() {
        let console = console("stdout", b"Booting...\nstarry:~# ");

        match console.next_line(WAIT) {
            Recv::Line(line) => assert_eq!(line, "Booting...\n"),
            other => panic!("unexpected {:?}", other),
        }
        match console.next_line(WAIT) {
            Recv::Line(line) => assert_eq!(line, "starry:~# "),
            other => panic!("unexpected {:?}", other),
        }
        for _ in 0..50 {
            match console.next_line(Duration::from_millis(100)) {
                Recv::Closed => return,
                Recv::Idle => continue,
                other => panic!("unexpected {:?}", other),
            }
        }
        panic!("console never closed");
    }

    #[test]
    fn split_partial_keeps_truncated_utf8_tail() {
        // "é" is 0xc3 0xa9; the read stopped after the first byte.
        let mut pending = b"ok \xc3".to_vec();
        match split_partial(&mut pending) {
            Some(Ok(line)) => assert_eq!(line, "ok "),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pending, b"\xc3");

        assert!(split_partial(&mut pending).is_none());
        pending.push(0xa9);
        match split_partial(&mut pending) {
            Some(Ok(line)) => assert_eq!(line, "é"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn invalid_utf8_is_reported_and_reading_continues() {
        let console = console("stderr", b"\xff\xfe\nlogin: \n");

        match console.next_line(WAIT) {
            Recv::Error(BootError::Decode(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match console.next_line(WAIT) {
            Recv::Line(line) => assert_eq!(line, "login: \n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn merges_multiple_readers() {
        let out: Box<dyn Read + Send> = Box::new(Cursor::new(&b"a\n"[..]));
        let err: Box<dyn Read + Send> = Box::new(Cursor::new(&b"b\n"[..]));
        let console = Console::from_readers(vec![("stdout", out), ("stderr", err)]).unwrap();

        let mut lines = vec![];
        for _ in 0..2 {
            match console.next_line(WAIT) {
                Recv::Line(line) => lines.push(line),
                other => panic!("unexpected {:?}", other),
            }
        }
        lines.sort();
        assert_eq!(lines, vec!["a\n".to_string(), "b\n".to_string()]);
    }
}
