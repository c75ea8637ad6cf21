// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::prelude::*;
use crate::util::logger::{Level, Logger, Record};

use std::sync::Mutex;

pub struct TestLogger {
	level: Level,
	pub(crate) id: String,
	pub lines: Mutex<HashMap<(&'static str, String), usize>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		Self::with_id("".to_owned())
	}
	pub fn with_id(id: String) -> TestLogger {
		TestLogger { level: Level::Trace, id, lines: Mutex::new(new_hash_map()) }
	}
	pub fn enable(&mut self, level: Level) {
		self.level = level;
	}
	pub fn assert_log(&self, module: &str, line: String, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		assert_eq!(log_entries.get(&(module, line)), Some(&count));
	}

	/// Search for the number of occurrences of a partially-matching log entry, with the
	/// substring `line` appearing anywhere within logged lines from module `module`.
	pub fn assert_log_contains(&self, module: &str, line: &str, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(m, ref l), _c)| m == module && l.contains(line))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count, "({} < {})", l, count);
	}
}

impl Logger for TestLogger {
	fn log(&self, record: Record) {
		if record.level < self.level {
			return;
		}
		let s = format!("{}", record.args);
		*self.lines.lock().unwrap().entry((record.module_path, s.clone())).or_insert(0) += 1;
		println!("{:<55} {}", format!("{} {} [{}:{}]", self.id, record.level, record.module_path, record.line), s);
	}
}
