//! Game Boy / Game Boy Color emulation core.
//!
//! The engine simulates the Sharp LR35902 CPU, its memory-mapped bus, the
//! cartridge bank controllers (ROM-only, MBC1, MBC5), the pixel-processing
//! unit, the timer block, and the joypad, paced to the wall clock on a
//! dedicated worker thread.
//!
//! [`start`] parses a ROM image and spawns the worker; the returned
//! [`Handle`] is the collaborator interface: request framebuffer copies,
//! feed key events, and stop the session. Presentation, audio synthesis,
//! and ROM file management belong to the caller.

pub mod cartridge;
mod cpu;
mod eventloop;
mod hardware;
mod joypad;
mod memory;
mod ppu;
mod sound;
mod time;
mod timer;
mod wram;

use eventloop::{Command, CommandQueue};
use std::ops::ControlFlow;
use std::sync::mpsc;
use std::sync::{Arc, PoisonError};
use std::thread;
use thiserror::Error;

pub use cartridge::{Cartridge, CartridgeError, RomHeader};
pub use cpu::{CpuRegister, CpuRegisterPair, CpuRegisters, InterruptType};
pub use hardware::Hardware;
pub use joypad::Key;
pub use ppu::{Frame, SCREEN_HEIGHT, SCREEN_WIDTH};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("the emulation worker is no longer running")]
    ChannelClosed,
    #[error("the emulation worker panicked")]
    WorkerPanicked,
}

/// Starts an emulation session for the given ROM image.
///
/// The hardware is constructed up front so header problems surface here;
/// the worker thread then runs until [`Handle::stop`] or drop.
pub fn start(rom: Vec<u8>) -> Result<Handle, CartridgeError> {
    let cartridge = Cartridge::new(rom)?;
    let hardware = Box::new(Hardware::new(cartridge));

    let commands: CommandQueue = Arc::default();
    let worker_commands = Arc::clone(&commands);
    let thread = thread::Builder::new()
        .name("luma-emulation".into())
        .spawn(move || eventloop::run(hardware, worker_commands))
        .expect("spawning the emulation worker thread failed");

    Ok(Handle {
        commands,
        thread: Some(thread),
    })
}

/// A pending framebuffer copy. The worker fulfills it on its next step.
pub struct FramePromise {
    receiver: mpsc::Receiver<Frame>,
}

impl FramePromise {
    /// Blocks until the frame arrives. Fails if the session stopped before
    /// the request was served.
    pub fn wait(self) -> Result<Frame, SessionError> {
        self.receiver.recv().map_err(|_| SessionError::ChannelClosed)
    }
}

/// Client handle to a running emulation session.
pub struct Handle {
    commands: CommandQueue,
    thread: Option<thread::JoinHandle<()>>,
}

impl Handle {
    fn post(&self, command: Command) {
        // Once the worker is gone, drop commands instead of queueing them so
        // their reply channels close immediately
        let worker_alive = self
            .thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished());
        if !worker_alive {
            return;
        }
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    /// Requests a copy of the current framebuffer.
    pub fn request_frame(&self) -> FramePromise {
        let (sender, receiver) = mpsc::sync_channel(1);
        self.post(Box::new(move |hardware: &mut Hardware| {
            let _ = sender.send(hardware.video.frame().clone());
            ControlFlow::Continue(())
        }));
        FramePromise { receiver }
    }

    pub fn press(&self, key: Key) {
        self.post(Box::new(move |hardware: &mut Hardware| {
            hardware.key_down(key);
            ControlFlow::Continue(())
        }));
    }

    pub fn release(&self, key: Key) {
        self.post(Box::new(move |hardware: &mut Hardware| {
            hardware.key_up(key);
            ControlFlow::Continue(())
        }));
    }

    /// Posts the stop command. The worker exits after draining the queue.
    pub fn stop(&self) {
        self.post(Box::new(|_: &mut Hardware| ControlFlow::Break(())));
    }

    /// Waits for the worker to exit. Reports a panic in the worker as an
    /// error; joining an already-joined session is a no-op.
    pub fn join(&mut self) -> Result<(), SessionError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| SessionError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
            let _ = self.join();
        }
    }
}
