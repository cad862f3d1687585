// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// Pretty printers for reporting information.
use std::{borrow::Cow, sync::Mutex};

use log::Level;

const VERTICAL: char = '│';
const UP_AND_RIGHT: char = '└';
const VERTICAL_AND_RIGHT: char = '├';

lazy_static::lazy_static! {
    static ref WARNINGS: Mutex<Vec<Vec<Cow<'static, str>>>> = Mutex::new(vec![]);
}

/// Log `title` and then each block of lines as a branch of a tree.
fn print_tree(level: Level, title: &str, blocks: &[Vec<Cow<'static, str>>]) {
    log::log!(level, "{}", console::style(title).bold());
    let num_blocks = blocks.len();
    for (i_block, block) in blocks.iter().enumerate() {
        let last_block = i_block + 1 == num_blocks;
        for (i_line, line) in block.iter().enumerate() {
            let symbol = match i_line {
                0 if last_block && block.len() == 1 => UP_AND_RIGHT,
                0 => VERTICAL_AND_RIGHT,
                _ => VERTICAL,
            };
            log::log!(level, "{symbol} {line}");
        }
    }
    log::log!(level, "");
}

/// Collects lines of information and logs them as a tree under a title.
pub(crate) struct InfoPrinter {
    title: Cow<'static, str>,
    blocks: Vec<Vec<Cow<'static, str>>>,
}

impl InfoPrinter {
    pub(crate) fn new(title: Cow<'static, str>) -> Self {
        Self {
            title,
            blocks: vec![],
        }
    }

    pub(crate) fn push_line(&mut self, line: Cow<'static, str>) {
        self.blocks.push(vec![line]);
    }

    pub(crate) fn push_block(&mut self, block: Vec<Cow<'static, str>>) {
        self.blocks.push(block);
    }

    pub(crate) fn display(self) {
        print_tree(Level::Info, &self.title, &self.blocks);
    }
}

/// Things that can be queued as warnings, to be displayed together by
/// [`display_warnings`].
pub(crate) trait Warn {
    fn warn(self);
}

fn queue_warning(block: Vec<Cow<'static, str>>) {
    match WARNINGS.lock() {
        Ok(mut w) => w.push(block),
        // Nothing else can be done with a warning.
        Err(_) => log::warn!("{}", block.join(" ")),
    }
}

impl Warn for &'static str {
    fn warn(self) {
        queue_warning(vec![self.into()]);
    }
}

impl Warn for String {
    fn warn(self) {
        queue_warning(vec![self.into()]);
    }
}

impl Warn for Vec<Cow<'static, str>> {
    fn warn(self) {
        queue_warning(self);
    }
}

/// Log any warnings that have been queued, then forget them. This should be
/// called once arguments have been turned into parameters.
pub(crate) fn display_warnings() {
    log::debug!("Displaying warnings");
    let blocks = match WARNINGS.lock() {
        Ok(mut w) => std::mem::take(&mut *w),
        Err(_) => return,
    };
    if !blocks.is_empty() {
        print_tree(Level::Warn, "Warnings", &blocks);
    }
}
