//! Terminal Engine - Relative positioning for in-place redraws
//!
//! We reserve N blank lines, move back up to the first of them and save that
//! spot as the anchor. Every row is then drawn relative to the anchor, so the
//! frame stays put no matter where the terminal put the cursor before.

use crossterm::{
    QueueableCommand,
    cursor::{MoveDown, MoveToColumn, MoveUp, RestorePosition, SavePosition},
    terminal::{Clear, ClearType},
};
use std::io::{Result, Write};

pub struct RelativeFrame<W: Write> {
    out: W,
    total_rows: u16,
    started: bool,
}

impl<W: Write> std::fmt::Debug for RelativeFrame<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelativeFrame")
            .field("total_rows", &self.total_rows)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<W: Write> RelativeFrame<W> {
    pub fn new(out: W, rows: u16) -> Self {
        Self {
            out,
            total_rows: rows,
            started: false,
        }
    }

    /// Reserve the rows and anchor the frame at the first one
    pub fn start(&mut self) -> Result<()> {
        for _ in 0..self.total_rows {
            writeln!(self.out)?;
        }
        if self.total_rows > 0 {
            self.out.queue(MoveUp(self.total_rows))?;
        }
        self.out.queue(MoveToColumn(0))?;
        self.out.queue(SavePosition)?;
        self.out.flush()?;
        self.started = true;
        Ok(())
    }

    /// Draw row `row_idx` (0..total_rows) with `f`
    pub fn write_row(&mut self, row_idx: u16, f: impl FnOnce(&mut W) -> Result<()>) -> Result<()> {
        if !self.started {
            self.start()?;
        }
        if row_idx >= self.total_rows {
            return Ok(());
        }

        self.out.queue(RestorePosition)?;
        if row_idx > 0 {
            self.out.queue(MoveDown(row_idx))?;
        }
        // Overwrite first, clear the tail after, so rows don't flash
        self.out.queue(MoveToColumn(0))?;
        f(&mut self.out)?;
        self.out.queue(Clear(ClearType::UntilNewLine))?;
        self.out.queue(RestorePosition)?;

        // Not flushed: callers batch rows and flush once
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()
    }

    /// Leave the cursor on the line below the frame
    pub fn finish(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.out.queue(RestorePosition)?;
        if self.total_rows > 0 {
            self.out.queue(MoveDown(self.total_rows))?;
        }
        self.out.queue(MoveToColumn(0))?;
        self.out.flush()?;
        self.started = false;
        Ok(())
    }
}
