//! Palette interrogation: Timed OSC 4 request/response exchange.
//!
//! The terminal is asked for its colours with one batched write of
//! `OSC 4 ; i ; ? BEL` queries. Answers arrive on the input stream mixed
//! with whatever the user happens to type, so the collector pulls OSC
//! colour reports out of the byte stream and hands everything else back.
//!
//! ```text
//!   write queries ──► collect until: all answered
//!                                  | quiet period with no bytes
//!                                  | overall timeout
//!                 ──► drain for the grace window ──► report + leftover bytes
//! ```
//!
//! Timeouts are never errors: whatever is missing falls back to the fixed
//! xterm palette.

use super::input::{osc_terminator, ColorSlot};
use super::output::OutputBuffer;
use crate::buffer::Rgb;
use crate::config::{PaletteConfig, PaletteMode};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, Instant};

/// Something that yields terminal input bytes with a timeout.
pub trait ByteSource {
    /// Wait up to `timeout` for the next batch of bytes.
    ///
    /// `None` means nothing arrived in time or the source is closed.
    fn recv_timeout(&mut self, timeout: Duration) -> Option<Vec<u8>>;
}

impl ByteSource for Receiver<Vec<u8>> {
    fn recv_timeout(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        match Receiver::recv_timeout(self, timeout) {
            Ok(bytes) => Some(bytes),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // a closed source would otherwise return immediately in a loop
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

/// A colour report found in an OSC body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscColor {
    /// `OSC 4 ; index ; spec`
    Palette(u8, Rgb),
    /// `OSC 10 ; spec` or `OSC 11 ; spec`
    Default(ColorSlot, Rgb),
}

/// Scale a 1 to 4 digit hex channel to 8 bits: `round(v * 255 / max)`.
///
/// Two-digit input comes back unchanged.
pub fn scale_channel(hex: &str) -> Option<u8> {
    if hex.is_empty() || hex.len() > 4 {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    let max = (1u32 << (4 * hex.len() as u32)) - 1;
    Some(((value * 255 + max / 2) / max) as u8)
}

/// Parse `rgb:R/G/B` or `#RGB` through `#RRRRGGGGBBBB`.
pub fn parse_color_spec(spec: &str) -> Option<Rgb> {
    if let Some(rest) = spec.strip_prefix("rgb:") {
        let mut parts = rest.split('/');
        let r = scale_channel(parts.next()?)?;
        let g = scale_channel(parts.next()?)?;
        let b = scale_channel(parts.next()?)?;
        return parts.next().is_none().then_some(Rgb::new(r, g, b));
    }
    let digits = spec.strip_prefix('#')?;
    if digits.is_empty() || digits.len() % 3 != 0 || digits.len() > 12 || !digits.is_ascii() {
        return None;
    }
    let n = digits.len() / 3;
    Some(Rgb::new(
        scale_channel(&digits[..n])?,
        scale_channel(&digits[n..2 * n])?,
        scale_channel(&digits[2 * n..])?,
    ))
}

/// Parse an OSC body (between `ESC ]` and the terminator) as a colour report.
pub fn parse_osc_color(body: &[u8]) -> Option<OscColor> {
    let body = std::str::from_utf8(body).ok()?;
    let mut fields = body.splitn(3, ';');
    match fields.next()? {
        "4" => {
            let index = fields.next()?.parse().ok()?;
            let color = parse_color_spec(fields.next()?)?;
            Some(OscColor::Palette(index, color))
        }
        "10" => Some(OscColor::Default(ColorSlot::Foreground, parse_color_spec(fields.next()?)?)),
        "11" => Some(OscColor::Default(ColorSlot::Background, parse_color_spec(fields.next()?)?)),
        _ => None,
    }
}

/// Convert an ANSI colour index to the standard xterm RGB value.
pub const fn ansi_to_rgb(idx: u8) -> Rgb {
    match idx {
        0 => Rgb::new(0, 0, 0),
        1 => Rgb::new(128, 0, 0),
        2 => Rgb::new(0, 128, 0),
        3 => Rgb::new(128, 128, 0),
        4 => Rgb::new(0, 0, 128),
        5 => Rgb::new(128, 0, 128),
        6 => Rgb::new(0, 128, 128),
        7 => Rgb::new(192, 192, 192),
        8 => Rgb::new(128, 128, 128),
        9 => Rgb::new(255, 0, 0),
        10 => Rgb::new(0, 255, 0),
        11 => Rgb::new(255, 255, 0),
        12 => Rgb::new(0, 0, 255),
        13 => Rgb::new(255, 0, 255),
        14 => Rgb::new(0, 255, 255),
        15 => Rgb::new(255, 255, 255),
        16..=231 => {
            let i = idx - 16;
            Rgb::new(cube_level(i / 36), cube_level((i / 6) % 6), cube_level(i % 6))
        }
        232..=255 => {
            let v = (idx - 232) * 10 + 8;
            Rgb::new(v, v, v)
        }
    }
}

const fn cube_level(v: u8) -> u8 {
    if v == 0 {
        0
    } else {
        v * 40 + 55
    }
}

/// Whether the terminal answers palette queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteSupport {
    /// At least one query was answered.
    Supported,
    /// No answer; colours are the built-in fallback.
    Unsupported,
    /// Detection was switched off by configuration.
    Disabled,
}

/// The terminal's colours as far as they are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    reported: BTreeMap<u8, Rgb>,
    /// Default foreground reported by OSC 10.
    pub default_fg: Option<Rgb>,
    /// Default background reported by OSC 11.
    pub default_bg: Option<Rgb>,
    /// How the palette was obtained.
    pub support: PaletteSupport,
}

impl Palette {
    /// The fixed xterm palette.
    pub const fn fallback(support: PaletteSupport) -> Self {
        Self {
            reported: BTreeMap::new(),
            default_fg: None,
            default_bg: None,
            support,
        }
    }

    /// Colour of `index`: the reported value, else the xterm default.
    pub fn color(&self, index: u8) -> Rgb {
        self.reported.get(&index).copied().unwrap_or(ansi_to_rgb(index))
    }

    /// Reported colour of `index`, if the terminal answered for it.
    pub fn reported(&self, index: u8) -> Option<Rgb> {
        self.reported.get(&index).copied()
    }

    /// Number of indices the terminal answered for.
    pub fn reported_count(&self) -> usize {
        self.reported.len()
    }

    /// Take in a report that arrived after detection finished.
    pub fn record(&mut self, report: OscColor) {
        match report {
            OscColor::Palette(index, color) => {
                self.reported.insert(index, color);
            }
            OscColor::Default(ColorSlot::Foreground, color) => self.default_fg = Some(color),
            OscColor::Default(ColorSlot::Background, color) => self.default_bg = Some(color),
        }
    }
}

/// Outcome of one interrogation.
#[derive(Debug, Clone)]
pub struct PaletteReport {
    /// Colours found.
    pub palette: Palette,
    /// Non-palette bytes seen meanwhile, for the input decoder.
    pub leftover: Vec<u8>,
    /// Time spent.
    pub elapsed: Duration,
}

/// Splits colour reports out of a byte stream.
#[derive(Debug, Default)]
struct Collector {
    pending: Vec<u8>,
    leftover: Vec<u8>,
    colors: BTreeMap<u8, Rgb>,
    default_fg: Option<Rgb>,
    default_bg: Option<Rgb>,
}

impl Collector {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut pos = 0;
        loop {
            let rest = &self.pending[pos..];
            let Some(start) = rest.windows(2).position(|w| w == b"\x1b]") else {
                // keep a trailing ESC that may start the next report
                let keep = usize::from(rest.last() == Some(&0x1b));
                self.leftover.extend_from_slice(&rest[..rest.len() - keep]);
                pos = self.pending.len() - keep;
                break;
            };
            self.leftover.extend_from_slice(&rest[..start]);
            let sequence = &rest[start..];
            let Some((body_end, used)) = osc_terminator(sequence) else {
                pos += start;
                break;
            };
            match parse_osc_color(&sequence[2..body_end]) {
                Some(OscColor::Palette(index, color)) => {
                    self.colors.insert(index, color);
                }
                Some(OscColor::Default(ColorSlot::Foreground, color)) => self.default_fg = Some(color),
                Some(OscColor::Default(ColorSlot::Background, color)) => self.default_bg = Some(color),
                None => self.leftover.extend_from_slice(&sequence[..used]),
            }
            pos += start + used;
        }
        self.pending.drain(..pos);
    }

    fn finish(mut self, support: PaletteSupport, started: Instant) -> PaletteReport {
        self.leftover.append(&mut self.pending);
        PaletteReport {
            palette: Palette {
                reported: self.colors,
                default_fg: self.default_fg,
                default_bg: self.default_bg,
                support,
            },
            leftover: self.leftover,
            elapsed: started.elapsed(),
        }
    }
}

/// Runs the palette exchange over a writer and a byte source.
#[derive(Debug, Clone)]
pub struct PaletteDetector {
    config: PaletteConfig,
}

impl PaletteDetector {
    /// Create a detector with the given timing.
    pub const fn new(config: PaletteConfig) -> Self {
        Self { config }
    }

    /// Detect the palette according to the configured mode.
    ///
    /// A non-TTY input is reported unsupported without sending anything.
    pub fn detect<W, S>(&self, out: &mut W, input: &mut S, is_tty: bool) -> PaletteReport
    where
        W: Write + ?Sized,
        S: ByteSource + ?Sized,
    {
        let started = Instant::now();
        match self.config.mode {
            PaletteMode::Off => {
                return Collector::default().finish(PaletteSupport::Disabled, started);
            }
            _ if !is_tty => {
                tracing::debug!("palette detection skipped: input is not a terminal");
                return Collector::default().finish(PaletteSupport::Unsupported, started);
            }
            PaletteMode::Auto => {
                let probe = self.exchange(out, input, &[0], false, self.config.probe_timeout);
                if probe.palette.reported(0).is_none() {
                    tracing::warn!(
                        timeout_ms = self.config.probe_timeout.as_millis() as u64,
                        "palette probe unanswered, using fallback palette"
                    );
                    return PaletteReport {
                        palette: Palette::fallback(PaletteSupport::Unsupported),
                        elapsed: started.elapsed(),
                        ..probe
                    };
                }
                let mut report = self.interrogate(out, input);
                let mut leftover = probe.leftover;
                leftover.append(&mut report.leftover);
                report.leftover = leftover;
                report.elapsed = started.elapsed();
                report
            }
            PaletteMode::Query => self.interrogate(out, input),
        }
    }

    /// Query every configured index (and the defaults, if enabled).
    pub fn interrogate<W, S>(&self, out: &mut W, input: &mut S) -> PaletteReport
    where
        W: Write + ?Sized,
        S: ByteSource + ?Sized,
    {
        let count = self.config.size.min(256);
        let indices: Vec<u8> = (0..count).map(|i| i as u8).collect();
        let report = self.exchange(out, input, &indices, self.config.query_defaults, self.config.overall_timeout);
        if report.palette.reported_count() < indices.len() {
            tracing::warn!(
                answered = report.palette.reported_count(),
                requested = indices.len(),
                "palette interrogation incomplete, missing entries use the fallback palette"
            );
        } else {
            tracing::debug!(answered = indices.len(), elapsed = ?report.elapsed, "palette interrogated");
        }
        report
    }

    fn exchange<W, S>(
        &self,
        out: &mut W,
        input: &mut S,
        indices: &[u8],
        defaults: bool,
        overall: Duration,
    ) -> PaletteReport
    where
        W: Write + ?Sized,
        S: ByteSource + ?Sized,
    {
        let started = Instant::now();
        let mut request = OutputBuffer::with_capacity(indices.len() * 12 + 16);
        request.query_palette(indices.iter().copied());
        if defaults {
            request.query_default_colors();
        }
        if let Err(error) = request.flush_to(out) {
            tracing::warn!(%error, "palette query could not be written");
            return Collector::default().finish(PaletteSupport::Unsupported, started);
        }

        let mut collector = Collector::default();
        let deadline = started + overall;
        let mut last_byte = started;
        let answered = |c: &Collector| {
            indices.iter().all(|i| c.colors.contains_key(i))
                && (!defaults || (c.default_fg.is_some() && c.default_bg.is_some()))
        };
        while !answered(&collector) {
            let now = Instant::now();
            let quiet_left = (last_byte + self.config.quiet_period).saturating_duration_since(now);
            let wait = quiet_left.min(deadline.saturating_duration_since(now));
            if wait.is_zero() {
                break;
            }
            if let Some(bytes) = input.recv_timeout(wait) {
                last_byte = Instant::now();
                collector.push(&bytes);
            }
        }

        // late answers must not leak into the next read
        let grace_end = Instant::now() + self.config.grace_period;
        loop {
            let wait = grace_end.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                break;
            }
            match input.recv_timeout(wait) {
                Some(bytes) => collector.push(&bytes),
                None => break,
            }
        }

        let support = if collector.colors.is_empty() {
            PaletteSupport::Unsupported
        } else {
            PaletteSupport::Supported
        };
        collector.finish(support, started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn fast_config(mode: PaletteMode) -> PaletteConfig {
        PaletteConfig {
            mode,
            size: 2,
            query_defaults: false,
            probe_timeout: Duration::from_millis(30),
            quiet_period: Duration::from_millis(30),
            overall_timeout: Duration::from_millis(200),
            grace_period: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_scale_channel() {
        assert_eq!(scale_channel("ff"), Some(255));
        assert_eq!(scale_channel("80"), Some(128));
        assert_eq!(scale_channel("ffff"), Some(255));
        assert_eq!(scale_channel("8080"), Some(128));
        assert_eq!(scale_channel("f"), Some(255));
        assert_eq!(scale_channel("8"), Some(136));
        assert_eq!(scale_channel(""), None);
        assert_eq!(scale_channel("fffff"), None);
    }

    #[test]
    fn test_parse_color_spec() {
        assert_eq!(parse_color_spec("rgb:ffff/0000/8080"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(parse_color_spec("#ff0080"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(parse_color_spec("#f08"), Some(Rgb::new(255, 0, 136)));
        assert_eq!(parse_color_spec("#ffff00008080"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(parse_color_spec("rgb:ff/00"), None);
        assert_eq!(parse_color_spec("#ff00"), None);
    }

    #[test]
    fn test_parse_osc_color() {
        assert_eq!(
            parse_osc_color(b"4;12;rgb:00/00/ff"),
            Some(OscColor::Palette(12, Rgb::new(0, 0, 255)))
        );
        assert_eq!(
            parse_osc_color(b"10;rgb:ffff/ffff/ffff"),
            Some(OscColor::Default(ColorSlot::Foreground, Rgb::WHITE))
        );
        assert_eq!(parse_osc_color(b"52;c;aGVsbG8="), None);
    }

    #[test]
    fn test_fallback_palette() {
        let palette = Palette::fallback(PaletteSupport::Unsupported);
        assert_eq!(palette.color(9), Rgb::new(255, 0, 0));
        assert_eq!(palette.color(16), Rgb::new(0, 0, 0));
        assert_eq!(palette.color(231), Rgb::new(255, 255, 255));
        assert_eq!(palette.color(232), Rgb::new(8, 8, 8));
    }

    #[test]
    fn test_collector_separates_reports_from_input() {
        let mut collector = Collector::default();
        collector.push(b"ab\x1b]4;1;rgb:ff/00/00\x07c\x1b");
        collector.push(b"]4;2;#00ff00\x1b\\d");
        assert_eq!(collector.colors.len(), 2);
        assert_eq!(collector.colors[&2], Rgb::new(0, 255, 0));
        assert_eq!(collector.leftover, b"abcd");
    }

    #[test]
    fn test_query_collects_answers() {
        let (tx, mut rx) = unbounded();
        tx.send(b"\x1b]4;0;rgb:0000/0000/0000\x07x\x1b]4;1;rgb:ffff/0000/0000\x07".to_vec())
            .unwrap();
        let detector = PaletteDetector::new(fast_config(PaletteMode::Query));
        let mut out = Vec::new();
        let report = detector.detect(&mut out, &mut rx, true);
        assert_eq!(out, b"\x1b]4;0;?\x07\x1b]4;1;?\x07");
        assert_eq!(report.palette.support, PaletteSupport::Supported);
        assert_eq!(report.palette.color(1), Rgb::new(255, 0, 0));
        assert_eq!(report.leftover, b"x");
    }

    #[test]
    fn test_non_tty_is_unsupported_quickly() {
        let (_tx, mut rx) = unbounded::<Vec<u8>>();
        let detector = PaletteDetector::new(fast_config(PaletteMode::Auto));
        let mut out = Vec::new();
        let report = detector.detect(&mut out, &mut rx, false);
        assert_eq!(report.palette.support, PaletteSupport::Unsupported);
        assert!(out.is_empty());
        assert!(report.elapsed < Duration::from_millis(30));
    }

    #[test]
    fn test_silent_terminal_times_out() {
        let (_tx, mut rx) = unbounded::<Vec<u8>>();
        let detector = PaletteDetector::new(fast_config(PaletteMode::Auto));
        let mut out = Vec::new();
        let report = detector.detect(&mut out, &mut rx, true);
        assert_eq!(report.palette.support, PaletteSupport::Unsupported);
        assert_eq!(report.palette.color(1), ansi_to_rgb(1));
        assert!(report.elapsed < Duration::from_millis(500));
    }
}
