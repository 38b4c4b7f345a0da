// Copyright 2026 The Databatch Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Optional logging setup for binaries and tests that want readable
//! output (§4.9). Library code never calls this itself; only `log`
//! macros are used at the instrumented call sites (store open/close,
//! framing resync, bad-batch skip/warn, poisoning, reset).

use once_cell::sync::OnceCell;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

static INIT: OnceCell<()> = OnceCell::new();

/// Installs a terminal logger at `level`. Safe to call more than once;
/// only the first call takes effect.
pub fn init_logging(level: LevelFilter) {
    INIT.get_or_init(|| {
        let _ = TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    });
}
