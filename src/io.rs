//! Integer IO for both execution paths.
//!
//! The interface for IO devices is defined with the [`IODevice`] trait.
//! This is exposed to the interpreter and the emulator with the [`AnyIO`] enum.
//!
//! Besides those two key items, this module also includes:
//! - [`EmptyIO`]: An `IODevice` holding the implementation for a lack of IO support.
//! - [`BufferedIO`]: An `IODevice` holding a buffered implementation for IO.
//! - [`BiChannelIO`]: An `IODevice` holding a threaded/channel implementation for IO.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::thread::JoinHandle;

use crossbeam_channel as cbc;

/// An IO device that integers can be read from and written to.
pub trait IODevice {
    /// Reads one integer.
    ///
    /// Depending on the device, this may block until a value is available.
    /// This returns `None` if no more values can be read.
    fn read_int(&self) -> Option<i16>;

    /// Writes one integer.
    ///
    /// This returns whether the write was successful or not.
    fn write_int(&self, value: i16) -> bool;

    /// Tries to close this IO device.
    fn close(self);
}

/// No IO. All reads and writes are unsuccessful.
pub struct EmptyIO;
impl IODevice for EmptyIO {
    fn read_int(&self) -> Option<i16> {
        None
    }

    fn write_int(&self, _value: i16) -> bool {
        false
    }

    fn close(self) {}
}

/// IO that reads from an input buffer and writes to an output buffer.
///
/// The buffers can be accessed in code via [`BufferedIO::get_input`] and [`BufferedIO::get_output`].
/// Clones of a `BufferedIO` share the same buffers, so a clone can be handed to
/// the interpreter or emulator while the original is kept to inspect the output.
///
/// Note that if a lock guard is acquired from one of the buffers
/// and held, the device blocks on reads and writes until it is released.
#[derive(Clone, Default, Debug)]
pub struct BufferedIO {
    input: Arc<RwLock<VecDeque<i16>>>,
    output: Arc<RwLock<Vec<i16>>>
}
impl BufferedIO {
    /// Creates a new BufferedIO.
    pub fn new() -> Self {
        Default::default()
    }
    /// Creates a new BufferedIO with the given values queued as input.
    pub fn with_input(input: impl IntoIterator<Item = i16>) -> Self {
        Self {
            input: Arc::new(RwLock::new(input.into_iter().collect())),
            output: Default::default()
        }
    }

    fn input(&self) -> RwLockWriteGuard<'_, VecDeque<i16>> {
        self.input.write().unwrap_or_else(|e| e.into_inner())
    }
    fn output(&self) -> RwLockWriteGuard<'_, Vec<i16>> {
        self.output.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Gets a reference to the input buffer.
    pub fn get_input(&self) -> &Arc<RwLock<VecDeque<i16>>> {
        &self.input
    }
    /// Gets a reference to the output buffer.
    pub fn get_output(&self) -> &Arc<RwLock<Vec<i16>>> {
        &self.output
    }
    /// Copies out everything written so far.
    pub fn output_values(&self) -> Vec<i16> {
        self.output().clone()
    }
}
impl IODevice for BufferedIO {
    fn read_int(&self) -> Option<i16> {
        self.input().pop_front()
    }

    fn write_int(&self, value: i16) -> bool {
        self.output().push(value);
        true
    }

    fn close(self) {}
}

/// A helper struct for [`BiChannelIO::new`],
/// indicating the channel is closed and no more reads/writes will come from it.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Stop;

/// An IO that reads from one channel and writes to another.
///
/// Reads block until the reader function produces a value,
/// and writes are handed off to the writer function.
pub struct BiChannelIO {
    read_data:    cbc::Receiver<i16>,
    #[allow(unused)]
    read_handler: JoinHandle<()>,

    write_data:    cbc::Sender<i16>,
    write_handler: JoinHandle<()>
}
impl BiChannelIO {
    /// Creates a new bi-channel IO device with the given reader and writer.
    ///
    /// This calls the reader function every time the IO input needs a value.
    /// The reader function should block until a value is ready, or return Stop
    /// if there are no more values to read.
    ///
    /// This calls the writer function every time a value needs to be written to the
    /// IO output.
    ///
    /// This uses threads to read and write from input and output. As such,
    /// the reader may be polled for one value ahead of the machine asking for it.
    pub fn new(
        mut reader: impl FnMut() -> Result<i16, Stop> + Send + 'static,
        mut writer: impl FnMut(i16) -> Result<(), Stop> + Send + 'static
    ) -> Self {
        let (read_tx, read_rx) = cbc::bounded(1);
        let (write_tx, write_rx) = cbc::bounded(1);

        // Reader thread:
        let read_handler = std::thread::spawn(move || loop {
            let Ok(value) = reader() else { return };
            let Ok(()) = read_tx.send(value) else { return };
        });

        // Writer thread:
        let write_handler = std::thread::spawn(move || {
            for value in write_rx {
                let Ok(()) = writer(value) else { return };
            }
        });

        Self {
            read_data: read_rx,
            read_handler,
            write_data: write_tx,
            write_handler
        }
    }

    /// Creates a bi-channel IO device with stdin being the read data and stdout being the write data.
    ///
    /// Input is read one integer per line. Reading stops at end of input
    /// or at the first line which is not an integer.
    /// Output is written one integer per line.
    pub fn stdio() -> Self {
        use std::io::{self, BufRead, Write};

        Self::new(
            || {
                let mut line = String::new();
                match io::stdin().lock().read_line(&mut line) {
                    Ok(0) | Err(_) => Err(Stop),
                    Ok(_) => line.trim().parse().map_err(|_| Stop),
                }
            },
            |value| {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{value}").map_err(|_| Stop)?;
                stdout.flush().map_err(|_| Stop)
            }
        )
    }
}

impl IODevice for BiChannelIO {
    fn read_int(&self) -> Option<i16> {
        // If the reader stopped (or panicked), the channel is disconnected.
        self.read_data.recv().ok()
    }

    fn write_int(&self, value: i16) -> bool {
        self.write_data.send(value).is_ok()
    }

    fn close(self) {
        let Self {
            read_data,
            read_handler: _,
            write_data,
            write_handler
        } = self;

        std::mem::drop(read_data);
        std::mem::drop(write_data);

        // The writer drains whatever is left and exits once the channel disconnects.
        // The reader is not joined, since it can be blocked on input indefinitely.
        let _ = write_handler.join();
    }
}

/// All the variants of IO accepted by the interpreter and the emulator.
#[derive(Default)]
pub enum AnyIO {
    /// No IO. This corresponds to the implementation of [`EmptyIO`].
    #[default]
    Empty,
    /// A buffered implementation. See [`BufferedIO`].
    Buffered(BufferedIO),
    /// A bi-channel IO implementation. See [`BiChannelIO`].
    BiChannel(BiChannelIO),
}
impl std::fmt::Debug for AnyIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyIO::Empty => f.write_str("Empty"),
            AnyIO::Buffered(io) => f.debug_tuple("Buffered").field(io).finish(),
            AnyIO::BiChannel(_) => f.write_str("BiChannel(..)"),
        }
    }
}
impl From<EmptyIO> for AnyIO {
    fn from(_value: EmptyIO) -> Self {
        AnyIO::Empty
    }
}
impl From<BufferedIO> for AnyIO {
    fn from(value: BufferedIO) -> Self {
        AnyIO::Buffered(value)
    }
}
impl From<BiChannelIO> for AnyIO {
    fn from(value: BiChannelIO) -> Self {
        AnyIO::BiChannel(value)
    }
}
impl IODevice for AnyIO {
    fn read_int(&self) -> Option<i16> {
        match self {
            AnyIO::Empty => EmptyIO.read_int(),
            AnyIO::Buffered(io) => io.read_int(),
            AnyIO::BiChannel(io) => io.read_int(),
        }
    }

    fn write_int(&self, value: i16) -> bool {
        match self {
            AnyIO::Empty => EmptyIO.write_int(value),
            AnyIO::Buffered(io) => io.write_int(value),
            AnyIO::BiChannel(io) => io.write_int(value),
        }
    }

    fn close(self) {
        match self {
            AnyIO::Empty => EmptyIO.close(),
            AnyIO::Buffered(io) => io.close(),
            AnyIO::BiChannel(io) => io.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{AnyIO, BiChannelIO, BufferedIO, IODevice, Stop};

    #[test]
    fn test_buffered_shared() {
        let io = BufferedIO::with_input([3, -4]);
        let any = AnyIO::from(io.clone());

        assert_eq!(any.read_int(), Some(3));
        assert_eq!(any.read_int(), Some(-4));
        assert_eq!(any.read_int(), None);

        assert!(any.write_int(12));
        assert!(any.write_int(-1));
        assert_eq!(io.output_values(), [12, -1]);
    }

    #[test]
    fn test_empty() {
        let io = AnyIO::default();
        assert_eq!(io.read_int(), None);
        assert!(!io.write_int(1));
    }

    #[test]
    fn test_bichannel() {
        let mut inputs = vec![7, 8].into_iter();
        let written = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&written);

        let io = BiChannelIO::new(
            move || inputs.next().ok_or(Stop),
            move |v| {
                sink.lock().unwrap().push(v);
                Ok(())
            }
        );

        assert_eq!(io.read_int(), Some(7));
        assert_eq!(io.read_int(), Some(8));
        assert_eq!(io.read_int(), None);
        assert!(io.write_int(5));
        assert!(io.write_int(6));

        // closing joins the writer, so everything has been written
        io.close();
        assert_eq!(*written.lock().unwrap(), [5, 6]);
    }
}
