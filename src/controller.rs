use anyhow::{Context, Result};

use crate::color::ColorScheme;
use crate::color_cache::{ColorBufferCache, ColorKey};
use crate::config::{RunConfig, SendFailurePolicy};
use crate::control::{ControlInbox, ControlMessage};
use crate::errors::classify;
use crate::frame_clock::{FrameClock, SystemTimeSource, TimeSource};
use crate::lightning::{LightningOdds, LightningSimulator};
use crate::model::Model;
use crate::opc::PixelSink;
use crate::params::{LightParameters, ParameterStore};
use crate::renderer::{PixelRenderer, RenderInput};
use crate::transform::SpatialTransform;

/// Size of the auxiliary (DMX) block appended to every frame.
pub const AUX_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Terminating,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub target_fps: u32,
    pub show_fps: bool,
    pub max_lightning: usize,
    pub seed: Option<u64>,
    pub channel: u8,
    pub on_send_error: SendFailurePolicy,
    pub color_scheme: ColorScheme,
    pub params: LightParameters,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

impl ControllerOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            target_fps: config.target_fps,
            show_fps: config.show_fps,
            max_lightning: config.max_lightning,
            seed: config.seed,
            channel: config.channel,
            on_send_error: config.on_send_error,
            color_scheme: config.color_scheme,
            params: config.params,
        }
    }
}

/// What happened during one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub dt: f64,
    pub lightning: usize,
    /// `false` when the frame was dropped while reconnecting.
    pub sent: bool,
}

/// Light effect controller: owns the model, parameters and per-frame state,
/// and streams one rendered frame per clock tick to the pixel sink.
pub struct LightController<S: TimeSource = SystemTimeSource> {
    model: Model,
    params: ParameterStore,
    clock: FrameClock<S>,
    transform: SpatialTransform,
    lightning: LightningSimulator,
    colors: ColorBufferCache,
    color_scheme: ColorScheme,
    renderer: Box<dyn PixelRenderer>,
    sink: Box<dyn PixelSink>,
    inbox: ControlInbox,
    channel: u8,
    aux: [u8; AUX_LEN],
    on_send_error: SendFailurePolicy,
    state: ControllerState,
    frames: u64,
}

impl LightController<SystemTimeSource> {
    pub fn new(
        model: Model,
        options: ControllerOptions,
        renderer: Box<dyn PixelRenderer>,
        sink: Box<dyn PixelSink>,
        inbox: ControlInbox,
    ) -> Self {
        let clock = FrameClock::new(options.target_fps, options.show_fps);
        Self::with_clock(model, options, clock, renderer, sink, inbox)
    }
}

impl<S: TimeSource> LightController<S> {
    pub fn with_clock(
        model: Model,
        options: ControllerOptions,
        clock: FrameClock<S>,
        renderer: Box<dyn PixelRenderer>,
        sink: Box<dyn PixelSink>,
        inbox: ControlInbox,
    ) -> Self {
        Self {
            model,
            params: ParameterStore::new(options.params),
            clock,
            transform: SpatialTransform::new(),
            lightning: LightningSimulator::new(options.max_lightning, options.seed),
            colors: ColorBufferCache::new(),
            color_scheme: options.color_scheme,
            renderer,
            sink,
            inbox,
            channel: options.channel,
            aux: [0; AUX_LEN],
            on_send_error: options.on_send_error,
            state: ControllerState::Running,
            frames: 0,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    pub fn lightning(&self) -> &LightningSimulator {
        &self.lightning
    }

    pub fn lightning_mut(&mut self) -> &mut LightningSimulator {
        &mut self.lightning
    }

    pub fn transform(&self) -> &SpatialTransform {
        &self.transform
    }

    pub fn color_cache(&self) -> &ColorBufferCache {
        &self.colors
    }

    pub fn clock(&self) -> &FrameClock<S> {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock<S> {
        &mut self.clock
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Auxiliary device bytes sent after the pixels of every frame.
    pub fn set_aux(&mut self, aux: [u8; AUX_LEN]) {
        self.aux = aux;
    }

    /// Run until a shutdown request or a fatal error, then close the sink.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            action = "run",
            points = self.model.len(),
            target_fps = 1.0 / self.clock.ideal_dt(),
            policy = ?self.on_send_error,
            scheme = ?self.color_scheme
        );

        let result = loop {
            match self.step() {
                Ok(Some(_)) => {}
                Ok(None) => break Ok(()),
                Err(error) => {
                    let kind = classify(&error);
                    tracing::error!(
                        action = "frame_failed",
                        frame = self.frames,
                        kind = ?kind,
                        error = %format!("{error:#}")
                    );
                    self.state = ControllerState::Terminating;
                    break Err(error);
                }
            }
        };

        self.sink.close();
        tracing::info!(action = "server_shutdown", frames = self.frames);
        result
    }

    /// Apply pending control messages, then advance the clock and draw one
    /// frame. Returns `None` once the controller is terminating.
    pub fn step(&mut self) -> Result<Option<FrameReport>> {
        self.apply_controls();
        if self.state == ControllerState::Terminating {
            return Ok(None);
        }

        let dt = self.clock.advance();
        self.draw_frame(dt).map(Some)
    }

    /// Apply every queued control message without waiting for more.
    pub fn apply_controls(&mut self) {
        for message in self.inbox.drain() {
            match message {
                ControlMessage::Set { name, value } => {
                    if let Err(error) = self.params.set(&name, value) {
                        tracing::warn!(action = "set_parameter", %error);
                    }
                }
                ControlMessage::Apply(params) => self.params.apply(&params),
                ControlMessage::Lightning { x, y, z } => {
                    self.lightning.make_lightning_bolt(x, y, z);
                }
                ControlMessage::Shutdown => self.state = ControllerState::Terminating,
            }
        }
        if self.inbox.shutdown_requested() {
            self.state = ControllerState::Terminating;
        }
    }

    /// Render and send one frame of length `dt` seconds.
    pub fn draw_frame(&mut self, dt: f64) -> Result<FrameReport> {
        self.frames += 1;
        let params = self.params.snapshot();

        self.transform.update(dt, &params);
        let matrix = self.transform.matrix(&params);

        let odds = LightningOdds {
            new: params.lightning_new,
            chain: params.lightning_chain,
        };
        let lightning = self
            .lightning
            .update(dt as f32, odds, &self.model.bounds());

        let key = ColorKey::from_params(self.color_scheme, &params);
        let colors = self.colors.refresh(key, &self.model);

        let mut pixels = self
            .renderer
            .render(&RenderInput {
                points: self.model.packed(),
                matrix: &matrix,
                colors,
                contrast: params.contrast as f32,
                lightning: &lightning,
            })
            .with_context(|| format!("failed to render frame {}", self.frames))?;

        let sent = self.deliver(&mut pixels)?;
        Ok(FrameReport {
            dt,
            lightning: lightning.len(),
            sent,
        })
    }

    fn deliver(&mut self, pixels: &mut [f32]) -> Result<bool> {
        let reconnect = self.on_send_error == SendFailurePolicy::Reconnect;

        if reconnect && !self.sink.is_connected() {
            if let Err(error) = self.sink.reconnect() {
                tracing::debug!(action = "drop_frame", frame = self.frames, %error);
                return Ok(false);
            }
        }

        match self.sink.send(self.channel, pixels, &self.aux) {
            Ok(()) => Ok(true),
            Err(error) if reconnect && error.is_connection_failure() => {
                tracing::warn!(action = "send_frame", frame = self.frames, %error, "will reconnect");
                Ok(false)
            }
            Err(error) => Err(anyhow::Error::new(error)
                .context(format!("failed to send frame {}", self.frames))),
        }
    }
}
