use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use focusvol_core::audio::{
    AudioError, AudioSession, SessionEntry, SessionHandle, SessionSource, Volume,
};
use libpulse_binding as pulse;
use libpulse_binding::callbacks::ListResult;
use libpulse_binding::context::{Context, FlagSet as CtxFlagSet, State as CtxState};
use libpulse_binding::mainloop::threaded::Mainloop;
use libpulse_binding::proplist::Proplist;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a caller waits for the PA thread to answer.
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// How often the PA thread checks for cancellation and context health when idle.
const IDLE_POLL: Duration = Duration::from_millis(100);

type Reply<T> = std_mpsc::Sender<Result<T, AudioError>>;

/// A playback stream as reported by the sound server.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkInput {
    pub index: u32,
    /// `application.process.binary` of the owning client.
    pub binary: Option<String>,
    pub volume: Volume,
    pub muted: bool,
    pub channels: u8,
}

/// Requests handled on the PA thread. Each carries its reply channel.
#[derive(Debug)]
pub enum AudioCommand {
    ListSinkInputs {
        reply: Reply<Vec<SinkInput>>,
    },
    SinkInputVolume {
        index: u32,
        volume: Volume,
        channels: u8,
        reply: Reply<bool>,
    },
    SinkInputMute {
        index: u32,
        mute: bool,
        reply: Reply<bool>,
    },
}

impl AudioCommand {
    fn fail(self, error: AudioError) {
        match self {
            AudioCommand::ListSinkInputs { reply } => {
                let _ = reply.send(Err(error));
            }
            AudioCommand::SinkInputVolume { reply, .. }
            | AudioCommand::SinkInputMute { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

/// Main PulseAudio thread function.
///
/// Runs the PA threaded mainloop and answers commands until cancelled,
/// reconnecting with backoff when the server goes away. `connected_tx`
/// mirrors the context state so callers can fail fast while disconnected.
pub fn run(
    cmd_rx: std_mpsc::Receiver<AudioCommand>,
    connected_tx: watch::Sender<bool>,
    cancel: CancellationToken,
) {
    let mut retry_delay_ms: u64 = 1000;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let session_start = std::time::Instant::now();
        let result = run_session(&cmd_rx, &connected_tx, &cancel);
        let _ = connected_tx.send(false);
        match result {
            Ok(()) => break,
            Err(e) => {
                warn!("PulseAudio session ended: {e}");
                if cancel.is_cancelled() {
                    return;
                }
                // Reset backoff if session was stable (ran >30s)
                if session_start.elapsed() > Duration::from_secs(30) {
                    retry_delay_ms = 1000;
                }
                reject_pending(&cmd_rx);
                std::thread::sleep(Duration::from_millis(retry_delay_ms));
                retry_delay_ms = (retry_delay_ms * 2).min(4000);
            }
        }
    }

    info!("PulseAudio thread exiting");
}

fn reject_pending(cmd_rx: &std_mpsc::Receiver<AudioCommand>) {
    while let Ok(cmd) = cmd_rx.try_recv() {
        cmd.fail(AudioError::Unavailable("PulseAudio disconnected".into()));
    }
}

fn run_session(
    cmd_rx: &std_mpsc::Receiver<AudioCommand>,
    connected_tx: &watch::Sender<bool>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    // Safety: Rc<RefCell> is used here because this entire function runs on a single
    // std::thread. Reply callbacks run on the mainloop thread but only capture
    // their own std channel senders.
    let mainloop =
        Rc::new(RefCell::new(Mainloop::new().ok_or_else(|| {
            anyhow::anyhow!("failed to create PA mainloop")
        })?));

    let mut proplist =
        Proplist::new().ok_or_else(|| anyhow::anyhow!("failed to create PA proplist"))?;
    proplist
        .set_str(pulse::proplist::properties::APPLICATION_NAME, "focusvol")
        .map_err(|_| anyhow::anyhow!("failed to set proplist"))?;

    let context = Rc::new(RefCell::new(
        Context::new_with_proplist(&*mainloop.borrow(), "focusvol", &proplist)
            .ok_or_else(|| anyhow::anyhow!("failed to create PA context"))?,
    ));

    // Connect (before mainloop starts, no lock needed)
    context
        .borrow_mut()
        .connect(None, CtxFlagSet::NOFLAGS, None)
        .map_err(|e| anyhow::anyhow!("PA connect failed: {e}"))?;

    mainloop
        .borrow_mut()
        .start()
        .map_err(|e| anyhow::anyhow!("PA mainloop start failed: {e}"))?;

    // Wait for context to be ready.
    // Must hold the mainloop lock when accessing the context from our thread.
    loop {
        if cancel.is_cancelled() {
            mainloop.borrow_mut().stop();
            return Ok(());
        }

        mainloop.borrow_mut().lock();
        let state = context.borrow().get_state();
        mainloop.borrow_mut().unlock();

        match state {
            CtxState::Ready => break,
            CtxState::Failed | CtxState::Terminated => {
                mainloop.borrow_mut().stop();
                return Err(anyhow::anyhow!("PA context failed to connect"));
            }
            _ => {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    info!("PulseAudio connected");
    let _ = connected_tx.send(true);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Blocks without the PA lock; wakes immediately on a command.
        let first = match cmd_rx.recv_timeout(IDLE_POLL) {
            Ok(cmd) => Some(cmd),
            Err(std_mpsc::RecvTimeoutError::Timeout) => None,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        };

        mainloop.borrow_mut().lock();

        let state = context.borrow().get_state();
        if state != CtxState::Ready {
            mainloop.borrow_mut().unlock();
            mainloop.borrow_mut().stop();
            if let Some(cmd) = first {
                cmd.fail(AudioError::Unavailable("PulseAudio disconnected".into()));
            }
            return Err(anyhow::anyhow!("PA context disconnected"));
        }

        if let Some(cmd) = first {
            execute_command(&context, cmd);
            while let Ok(cmd) = cmd_rx.try_recv() {
                execute_command(&context, cmd);
            }
        }

        mainloop.borrow_mut().unlock();
    }

    // Clean shutdown
    mainloop.borrow_mut().lock();
    context.borrow_mut().disconnect();
    mainloop.borrow_mut().unlock();
    mainloop.borrow_mut().stop();
    Ok(())
}

fn make_channel_volumes(volume: Volume, channels: u8) -> pulse::volume::ChannelVolumes {
    let pa_vol = volume_to_pa(volume);
    let mut cv = pulse::volume::ChannelVolumes::default();
    cv.set(channels.max(1), pa_vol);
    cv
}

/// Execute a PA command. Caller must hold the mainloop lock.
fn execute_command(context: &Rc<RefCell<Context>>, cmd: AudioCommand) {
    let mut introspect = context.borrow().introspect();

    match cmd {
        AudioCommand::ListSinkInputs { reply } => {
            let mut streams = Vec::new();
            introspect.get_sink_input_info_list(move |result| match result {
                ListResult::Item(info) => {
                    let vol = pulse::volume::VolumeLinear::from(info.volume.avg()).0;
                    streams.push(SinkInput {
                        index: info.index,
                        binary: info.proplist.get_str("application.process.binary"),
                        volume: Volume::new(vol),
                        muted: info.mute,
                        channels: info.volume.len(),
                    });
                }
                ListResult::End => {
                    debug!("PA listed {} sink-inputs", streams.len());
                    let _ = reply.send(Ok(std::mem::take(&mut streams)));
                }
                ListResult::Error => {
                    let _ = reply.send(Err(AudioError::Unavailable(
                        "sink-input query failed".into(),
                    )));
                }
            });
        }
        AudioCommand::SinkInputVolume {
            index,
            volume,
            channels,
            reply,
        } => {
            let cv = make_channel_volumes(volume, channels);
            introspect.set_sink_input_volume(
                index,
                &cv,
                Some(Box::new(move |success| {
                    let _ = reply.send(Ok(success));
                })),
            );
        }
        AudioCommand::SinkInputMute { index, mute, reply } => {
            introspect.set_sink_input_mute(
                index,
                mute,
                Some(Box::new(move |success| {
                    let _ = reply.send(Ok(success));
                })),
            );
        }
    }
}

fn volume_to_pa(volume: Volume) -> pulse::volume::Volume {
    pulse::volume::Volume::from(pulse::volume::VolumeLinear(volume.get()))
}

/// Synchronous request/reply access to the PA thread. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PulseClient {
    cmd_tx: std_mpsc::Sender<AudioCommand>,
    connected: watch::Receiver<bool>,
}

impl PulseClient {
    pub fn new(cmd_tx: std_mpsc::Sender<AudioCommand>, connected: watch::Receiver<bool>) -> Self {
        PulseClient { cmd_tx, connected }
    }

    fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> AudioCommand,
    ) -> Result<T, AudioError> {
        if !*self.connected.borrow() {
            return Err(AudioError::Unavailable("not connected to PulseAudio".into()));
        }
        let (reply_tx, reply_rx) = std_mpsc::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .map_err(|_| AudioError::Unavailable("PulseAudio thread stopped".into()))?;
        match reply_rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(result) => result,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                Err(AudioError::Timeout(REPLY_TIMEOUT.as_millis() as u64))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(AudioError::Unavailable(
                "PulseAudio dropped the request".into(),
            )),
        }
    }

    /// Current playback streams.
    pub fn sink_inputs(&self) -> Result<Vec<SinkInput>, AudioError> {
        self.request(|reply| AudioCommand::ListSinkInputs { reply })
    }

    fn set_sink_input_volume(
        &self,
        stream: &SinkInput,
        volume: Volume,
    ) -> Result<bool, AudioError> {
        self.request(|reply| AudioCommand::SinkInputVolume {
            index: stream.index,
            volume,
            channels: stream.channels,
            reply,
        })
    }

    fn set_sink_input_mute(&self, stream: &SinkInput, mute: bool) -> Result<bool, AudioError> {
        self.request(|reply| AudioCommand::SinkInputMute {
            index: stream.index,
            mute,
            reply,
        })
    }
}

impl SessionSource for PulseClient {
    fn enumerate_sessions(&self) -> Result<Vec<SessionEntry>, AudioError> {
        let streams = self.sink_inputs()?;
        Ok(session_names(&streams)
            .into_iter()
            .map(|binary| {
                let handle: SessionHandle = Arc::new(PulseSession {
                    binary: binary.clone(),
                    client: self.clone(),
                });
                SessionEntry {
                    process_name: binary,
                    handle,
                }
            })
            .collect())
    }
}

/// Distinct binaries among `streams`, in first-seen order.
fn session_names(streams: &[SinkInput]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for binary in streams.iter().filter_map(|s| s.binary.as_deref()) {
        if !names.iter().any(|n| n == binary) {
            names.push(binary.to_string());
        }
    }
    names
}

/// All playback streams of one executable, controlled as a unit.
///
/// Streams are looked up again on every call: applications open and close
/// streams freely, and the handle stays valid as long as at least one
/// exists.
#[derive(Debug)]
pub struct PulseSession {
    binary: String,
    client: PulseClient,
}

impl PulseSession {
    fn streams(&self) -> Result<Vec<SinkInput>, AudioError> {
        let streams: Vec<SinkInput> = self
            .client
            .sink_inputs()?
            .into_iter()
            .filter(|s| s.binary.as_deref() == Some(self.binary.as_str()))
            .collect();
        if streams.is_empty() {
            return Err(AudioError::SessionGone(self.binary.clone()));
        }
        Ok(streams)
    }

    /// Apply `op` to every stream; succeeds if any stream accepted it.
    fn for_each_stream(
        &self,
        op: impl Fn(&SinkInput) -> Result<bool, AudioError>,
    ) -> Result<(), AudioError> {
        let mut applied = false;
        for stream in self.streams()? {
            if op(&stream)? {
                applied = true;
            } else {
                debug!("sink-input {} of {} rejected the change", stream.index, self.binary);
            }
        }
        if applied {
            Ok(())
        } else {
            Err(AudioError::SessionGone(self.binary.clone()))
        }
    }
}

impl AudioSession for PulseSession {
    fn process_name(&self) -> &str {
        &self.binary
    }

    fn master_volume(&self) -> Result<Volume, AudioError> {
        Ok(loudest(&self.streams()?))
    }

    fn set_master_volume(&self, volume: Volume) -> Result<(), AudioError> {
        self.for_each_stream(|s| self.client.set_sink_input_volume(s, volume))
    }

    fn is_muted(&self) -> Result<bool, AudioError> {
        Ok(self.streams()?.iter().all(|s| s.muted))
    }

    fn set_mute(&self, mute: bool) -> Result<(), AudioError> {
        self.for_each_stream(|s| self.client.set_sink_input_mute(s, mute))
    }
}

fn loudest(streams: &[SinkInput]) -> Volume {
    streams
        .iter()
        .map(|s| s.volume)
        .fold(Volume::ZERO, |a, b| if b > a { b } else { a })
}
