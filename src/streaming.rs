//! Looping audio output through rodio.
//!
//! The platform stream lives on a dedicated output thread (cpal streams are
//! not `Send`), driven by commands from the controller thread. Each start
//! command builds a fresh sink and a fresh loopable source over the shared
//! sample buffer; stopped sources are never restarted.

use std::sync::mpsc;
use std::thread::JoinHandle;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink, Source};

use crate::playback::OutputSink;
use crate::render::PreparedAudio;
use crate::{PlayerError, Result};

enum SinkCommand {
    Start(PreparedAudio),
    Stop,
    Shutdown,
}

/// rodio-backed [`OutputSink`] that loops prepared audio to the default
/// output device.
pub struct RodioSink {
    commands: mpsc::Sender<SinkCommand>,
    worker: Option<JoinHandle<()>>,
}

impl RodioSink {
    /// Open the default output device and start the output thread.
    pub fn new() -> Result<Self> {
        let (commands, receiver) = mpsc::channel();
        let (ack, ready) = mpsc::channel::<Result<()>>();

        let worker = std::thread::spawn(move || run_output_thread(receiver, ack));

        match ready.recv() {
            Ok(Ok(())) => Ok(Self {
                commands,
                worker: Some(worker),
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(PlayerError::AudioDevice(
                    "output thread exited during startup".into(),
                ))
            }
        }
    }
}

impl OutputSink for RodioSink {
    fn start_loop(&mut self, audio: &PreparedAudio) -> Result<()> {
        self.commands
            .send(SinkCommand::Start(audio.clone()))
            .map_err(|_| PlayerError::AudioDevice("output thread is gone".into()))
    }

    fn stop(&mut self) {
        let _ = self.commands.send(SinkCommand::Stop);
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.commands.send(SinkCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Output thread body: owns the platform stream, serves sink commands.
fn run_output_thread(receiver: mpsc::Receiver<SinkCommand>, ack: mpsc::Sender<Result<()>>) {
    let (stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(err) => {
            let _ = ack.send(Err(PlayerError::AudioDevice(format!(
                "failed to open output stream: {err}"
            ))));
            return;
        }
    };
    // Keep the stream alive for the thread's lifetime.
    let _stream = stream;
    let _ = ack.send(Ok(()));

    let mut sink: Option<Sink> = None;

    while let Ok(command) = receiver.recv() {
        match command {
            SinkCommand::Start(audio) => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
                match Sink::try_new(&handle) {
                    Ok(new_sink) => {
                        new_sink.append(loop_source(&audio));
                        new_sink.play();
                        sink = Some(new_sink);
                    }
                    Err(err) => {
                        eprintln!("audio sink creation failed: {err}");
                    }
                }
            }
            SinkCommand::Stop => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
            }
            SinkCommand::Shutdown => break,
        }
    }

    if let Some(old) = sink.take() {
        old.stop();
    }
}

/// Build a fresh infinite-loop source over the mono buffer, duplicated to
/// both stereo channels.
fn loop_source(audio: &PreparedAudio) -> impl Source<Item = f32> {
    let mut interleaved = Vec::with_capacity(audio.len() * 2);
    for &sample in audio.samples.iter() {
        interleaved.push(sample);
        interleaved.push(sample);
    }
    // The exact chip rate is fractional; the device API takes integer Hz.
    // Duration math stays on the exact rate, only the stream setup rounds.
    let device_rate = audio.sample_rate.round() as u32;
    SamplesBuffer::new(2, device_rate, interleaved).repeat_infinite()
}
