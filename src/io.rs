// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Diagnostic output. The board supplies a [`DiagPort`], usually its serial
//! console, and the `log` macros used throughout the HAL are routed to it.

use spin::Mutex;

/// Polled, byte-at-a-time output owned by the board.
pub trait DiagPort: Send {
    fn putc(&mut self, byte: u8);
}

static PORT: Mutex<Option<&'static mut dyn DiagPort>> = Mutex::new(None);

/// Install the port diagnostics are written to, replacing any previous one.
pub fn set_diag_port(port: &'static mut dyn DiagPort) {
    *PORT.lock() = Some(port);
}

/// Terminal-side view of a port: line feeds go out as `\r\n`.
struct Diag<'a>(&'a mut dyn DiagPort);

impl core::fmt::Write for Diag<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.0.putc(b'\r');
            }
            self.0.putc(byte);
        }

        Ok(())
    }
}

/// Format straight to the diagnostic port. Without one installed the output
/// is dropped.
pub fn diag_write(args: core::fmt::Arguments) {
    use core::fmt::Write;

    if let Some(port) = PORT.lock().as_deref_mut() {
        let _ = Diag(port).write_fmt(args);
    }
}

struct DiagLogger;

impl log::Log for DiagLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let target = record.module_path().unwrap_or_else(|| record.target());

        #[cfg(debug_assertions)]
        diag_write(format_args!(
            "[ {:>5} ] [{} {}:{}] {}\n",
            record.level(),
            target,
            record.file().unwrap_or("<n/a>"),
            record.line().unwrap_or(0),
            record.args()
        ));

        #[cfg(not(debug_assertions))]
        diag_write(format_args!("[ {:>5} ] [{}] {}\n", record.level(), target, record.args()));
    }

    fn flush(&self) {}
}

/// Route the `log` macros to the diagnostic port.
pub fn init_logging(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&DiagLogger)?;
    log::set_max_level(level);

    Ok(())
}
