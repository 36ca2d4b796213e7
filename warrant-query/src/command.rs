use tracing::{debug, info};
use warrant_common::{Query, QueryConfig, is_valid_underlying_code};

/// What a chat message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(Query),
    Help,
    /// Known keyword, bad or missing argument. Carries the reply to send.
    Malformed { hint: String },
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Quick,
    Full,
    OutOfMoney,
    Help,
}

/// Leading keywords per intent, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct Keywords {
    pub quick: Vec<String>,
    pub full: Vec<String>,
    pub out_of_money: Vec<String>,
    pub help: Vec<String>,
}

impl Default for Keywords {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            quick: owned(&["快查"]),
            full: owned(&["查詢"]),
            out_of_money: owned(&["價外"]),
            help: owned(&["幫助", "help", "說明", "?", "？"]),
        }
    }
}

impl Keywords {
    fn table(&self) -> [(Verb, &[String]); 4] {
        [
            (Verb::Quick, self.quick.as_slice()),
            (Verb::Full, self.full.as_slice()),
            (Verb::OutOfMoney, self.out_of_money.as_slice()),
            (Verb::Help, self.help.as_slice()),
        ]
    }

    fn exact(&self, token: &str) -> Option<Verb> {
        let token = token.to_lowercase();
        self.table()
            .into_iter()
            .find(|(_, words)| words.iter().any(|w| w.to_lowercase() == token))
            .map(|(verb, _)| verb)
    }

    /// Query keyword glued to a code, e.g. `快查6669`.
    fn glued<'t>(&self, token: &'t str) -> Option<(Verb, &'t str)> {
        self.table()
            .into_iter()
            .filter(|(verb, _)| *verb != Verb::Help)
            .find_map(|(verb, words)| {
                words.iter().find_map(|w| {
                    let rest = token.strip_prefix(w.as_str())?;
                    rest.starts_with(|c: char| c.is_ascii_digit())
                        .then_some((verb, rest))
                })
            })
    }
}

/// Classifies chat text into a [`Command`]. Never fetches or replies.
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    keywords: Keywords,
    config: QueryConfig,
}

impl CommandInterpreter {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            keywords: Keywords::default(),
            config,
        }
    }

    pub fn with_keywords(mut self, keywords: Keywords) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn parse(&self, input: &str) -> Command {
        let trimmed = input.trim();
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or_default();
        let tail = parts.next().unwrap_or_default();

        let (verb, args): (Verb, Vec<&str>) = match self.keywords.exact(head) {
            Some(verb) => (verb, tail.split_whitespace().collect()),
            None => match self.keywords.glued(head) {
                Some((verb, first)) => (
                    verb,
                    std::iter::once(first)
                        .chain(tail.split_whitespace())
                        .collect(),
                ),
                None => {
                    debug!(target: "warrant.command", text = %trimmed, "unrecognized input");
                    return Command::Unrecognized(trimmed.to_string());
                }
            },
        };

        let command = match verb {
            Verb::Help => Command::Help,
            Verb::Quick => self.single_code(verb, &args, |code| Query::quick(code, &self.config)),
            Verb::Full => self.single_code(verb, &args, |code| Query::full(code, &self.config)),
            Verb::OutOfMoney => self.out_of_money(&args),
        };
        info!(target: "warrant.command", text = %trimmed, command = ?command, "parsed command");
        command
    }

    fn single_code(
        &self,
        verb: Verb,
        args: &[&str],
        build: impl FnOnce(&str) -> warrant_common::Result<Query>,
    ) -> Command {
        match args {
            [code] if is_valid_underlying_code(code) => match build(code) {
                Ok(query) => Command::Query(query),
                Err(_) => self.malformed(verb),
            },
            _ => self.malformed(verb),
        }
    }

    fn out_of_money(&self, args: &[&str]) -> Command {
        let pages = match args {
            [code] if is_valid_underlying_code(code) => None,
            [code, pages] if is_valid_underlying_code(code) => match pages.parse::<u32>() {
                Ok(n) if n >= 1 => Some(n),
                _ => return self.malformed(Verb::OutOfMoney),
            },
            _ => return self.malformed(Verb::OutOfMoney),
        };
        match Query::out_of_money(args[0], pages, &self.config) {
            Ok(query) => Command::Query(query),
            Err(_) => self.malformed(Verb::OutOfMoney),
        }
    }

    fn malformed(&self, verb: Verb) -> Command {
        Command::Malformed {
            hint: usage_hint(verb),
        }
    }

    /// Reply for the help command.
    pub fn help_text(&self) -> String {
        let cfg = &self.config;
        format!(
            "📖 權證查詢機器人使用說明\n\n\
             🔍 快速查詢（{filter}權證 + 前{pages}頁）\n\
             指令: 快查 股票代號\n\
             範例: 快查 6669\n\n\
             🔎 完整查詢（全部權證 + 全部頁面）\n\
             指令: 查詢 股票代號\n\
             範例: 查詢 2330\n\n\
             📉 價外查詢（只顯示價外權證）\n\
             指令: 價外 股票代號 [頁數]\n\
             範例: 價外 6669 或 價外 6669 5\n\n\
             💡 股票代號為 4-6 位數字\n\
             ❓ 輸入「幫助」查看此說明",
            filter = cfg.quick_mode_broker_filter,
            pages = cfg.quick_mode_max_pages,
        )
    }
}

fn usage_hint(verb: Verb) -> String {
    let usage = match verb {
        Verb::Quick => "快查 股票代號\n範例: 快查 6669",
        Verb::Full => "查詢 股票代號\n範例: 查詢 2330",
        Verb::OutOfMoney => "價外 股票代號 [頁數]\n範例: 價外 6669 5",
        Verb::Help => "幫助",
    };
    format!("❌ 指令格式錯誤\n用法: {usage}\n💡 股票代號為 4-6 位數字")
}

/// Reply for unrecognized input when the deployment chooses to answer it.
pub fn unknown_command_text() -> String {
    "❌ 無法識別的指令\n\n\
     請使用以下格式:\n\
     • 快查 6669\n\
     • 查詢 2330\n\
     • 價外 6669 5\n\
     • 幫助"
        .to_string()
}
