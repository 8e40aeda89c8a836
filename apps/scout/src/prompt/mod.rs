//! Interactive run configuration.
//!
//! Input collection is an indexed list of steps with a cursor. Valid input
//! moves the cursor forward; `b` / `back` moves it one step back, keeping
//! earlier answers as defaults. The list is independent of the terminal:
//! `run_steps` drives it through any `PromptIo`.

use std::collections::HashMap;

use crate::console::PromptIo;
use crate::errors::AppError;
use crate::llm_client::prompts::DEFAULT_BRIEFING_TEMPLATE;
use crate::models::run::{default_filename, default_stem, parse_employers, parse_positions};
use crate::models::RunConfiguration;
use crate::output::workbook::EXTENSION;
use crate::qualification::login::parse_login_threshold;
use crate::qualification::tenure::{is_valid_threshold, PRESENT};

const BACK_COMMANDS: [&str; 2] = ["b", "back"];
const MULTILINE_END: &str = "END";

type Validator = fn(&str) -> Result<(), String>;
type Derived = fn(&Answers) -> Option<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Line,
    /// Lines until a lone `END`.
    Multiline,
    /// Prints the collected configuration before asking.
    Confirm,
}

#[derive(Clone)]
pub enum StepDefault {
    None,
    Fixed(&'static str),
    Derived(Derived),
}

#[derive(Clone)]
pub struct Step {
    pub key: &'static str,
    pub prompt: &'static str,
    pub default: StepDefault,
    pub required: bool,
    pub kind: StepKind,
    pub validate: Option<Validator>,
}

impl Step {
    pub fn line(key: &'static str, prompt: &'static str) -> Self {
        Self {
            key,
            prompt,
            default: StepDefault::None,
            required: false,
            kind: StepKind::Line,
            validate: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: &'static str) -> Self {
        self.default = StepDefault::Fixed(value);
        self
    }

    pub fn derived_default(mut self, derive: Derived) -> Self {
        self.default = StepDefault::Derived(derive);
        self
    }

    pub fn validated(mut self, validate: Validator) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Answers(HashMap<&'static str, String>);

impl Answers {
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).eq_ignore_ascii_case("y")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next,
    Back,
    AtFirst,
    Required,
    Invalid(String),
}

pub struct StepList {
    steps: Vec<Step>,
    cursor: usize,
    answers: Answers,
}

impl StepList {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            cursor: 0,
            answers: Answers::default(),
        }
    }

    pub fn current(&self) -> Option<&Step> {
        self.steps.get(self.cursor)
    }

    pub fn position(&self) -> (usize, usize) {
        (self.cursor + 1, self.steps.len())
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    /// The earlier answer for the current step, else its default.
    pub fn current_default(&self) -> Option<String> {
        let step = self.current()?;
        if let Some(previous) = self.answers.0.get(step.key) {
            return Some(previous.clone());
        }
        match step.default {
            StepDefault::None => None,
            StepDefault::Fixed(value) => Some(value.to_string()),
            StepDefault::Derived(derive) => derive(&self.answers),
        }
    }

    pub fn submit(&mut self, input: &str) -> Advance {
        let Some(step) = self.current().cloned() else {
            return Advance::Next;
        };
        let trimmed = input.trim();

        if BACK_COMMANDS.iter().any(|b| trimmed.eq_ignore_ascii_case(b)) {
            if self.cursor == 0 {
                return Advance::AtFirst;
            }
            self.cursor -= 1;
            return Advance::Back;
        }

        let value = if trimmed.is_empty() {
            match self.current_default() {
                Some(default) => default,
                None if step.required => return Advance::Required,
                None => String::new(),
            }
        } else if step.kind == StepKind::Multiline {
            input.to_string()
        } else {
            trimmed.to_string()
        };

        if step.required && value.trim().is_empty() {
            return Advance::Required;
        }
        if let Some(validate) = step.validate {
            if let Err(message) = validate(&value) {
                return Advance::Invalid(message);
            }
        }

        self.answers.0.insert(step.key, value);
        self.cursor += 1;
        Advance::Next
    }
}

/// Drives `list` to completion. `None` when input closes first.
pub fn run_steps(list: &mut StepList, io: &mut dyn PromptIo) -> Option<()> {
    while let Some(step) = list.current().cloned() {
        let (index, total) = list.position();
        if step.kind == StepKind::Confirm {
            io.say(&describe(list.answers()));
        }
        let mut header = format!("\n[Step {index}/{total}] {}", step.prompt);
        if let Some(default) = list.current_default().filter(|d| !d.is_empty()) {
            if step.kind != StepKind::Multiline {
                header.push_str(&format!(" (默认: {default})"));
            }
        }
        io.say(&header);
        io.say("输入 'b' 或 'back' 返回上一步");

        let input = match step.kind {
            StepKind::Multiline => read_multiline(io)?,
            _ => io.read_line()?,
        };

        match list.submit(&input) {
            Advance::Next => {}
            Advance::Back => io.say("返回上一步..."),
            Advance::AtFirst => io.say("已经是第一步。"),
            Advance::Required => io.say("此项为必填项，请输入。"),
            Advance::Invalid(message) => io.say(&format!("输入无效: {message}")),
        }
    }
    Some(())
}

fn read_multiline(io: &mut dyn PromptIo) -> Option<String> {
    let first = io.read_line()?;
    if BACK_COMMANDS.iter().any(|b| first.trim().eq_ignore_ascii_case(b)) {
        return Some(first);
    }
    let mut lines = Vec::new();
    let mut line = first;
    loop {
        if line.trim().eq_ignore_ascii_case(MULTILINE_END) {
            break;
        }
        lines.push(line);
        line = io.read_line()?;
    }
    Some(lines.join("\n"))
}

/// Asks a y/n question; empty input takes `default`.
pub fn ask_yes_no(io: &mut dyn PromptIo, question: &str, default: bool) -> Option<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    loop {
        io.say(&format!("{question} ({hint})"));
        let answer = io.read_line()?;
        match answer.trim().to_lowercase().as_str() {
            "" => return Some(default),
            "y" | "yes" => return Some(true),
            "n" | "no" => return Some(false),
            _ => io.say("请输入 y 或 n。"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Run configuration
// ────────────────────────────────────────────────────────────────────────────

fn validate_yes_no(value: &str) -> Result<(), String> {
    match value.trim().to_lowercase().as_str() {
        "y" | "n" => Ok(()),
        _ => Err("请输入 y 或 n".to_string()),
    }
}

fn validate_employers(value: &str) -> Result<(), String> {
    if parse_employers(value).is_empty() {
        Err("至少需要一个公司".to_string())
    } else {
        Ok(())
    }
}

fn validate_tenure_threshold(value: &str) -> Result<(), String> {
    if is_valid_threshold(value) {
        Ok(())
    } else {
        Err(format!("格式应为 YY/M 或 '{PRESENT}'"))
    }
}

fn validate_login_threshold(value: &str) -> Result<(), String> {
    if value.trim().is_empty() || parse_login_threshold(value).is_some() {
        Ok(())
    } else {
        Err("格式应为 YYYY/MM/DD、YY/MM/DD 或 YY/M".to_string())
    }
}

fn derived_filename(answers: &Answers) -> Option<String> {
    let employers = parse_employers(answers.get("employers"));
    let stem = default_stem(answers.get("category"), &employers);
    Some(default_filename(
        &stem,
        &parse_positions(answers.get("positions")),
        EXTENSION,
    ))
}

pub fn run_configuration_steps() -> Vec<Step> {
    vec![
        Step::line("category", "请输入分类 (例如: 上游/下游)").required(),
        Step::line("employers", "请输入公司和配额，用'/'分隔 (格式: 公司A 10/公司B 5)")
            .required()
            .validated(validate_employers),
        Step::line("positions", "请输入关键词，用'-'分隔 (例如: 产品经理-数据分析师，留空不限)"),
        Step::line("view_phone", "是否需要查看联系方式? (y/N)")
            .default_value("n")
            .validated(validate_yes_no),
        Step::line("initials", "姓名是否只保留首字母缩写? (y/N)")
            .default_value("n")
            .validated(validate_yes_no),
        Step::line("filename", "请输入输出文件名").derived_default(derived_filename),
        Step::line("min_tenure", "离职年限不早于 (格式: YY/M 或 'Present')")
            .default_value(PRESENT)
            .validated(validate_tenure_threshold),
        Step::line("min_login", "最后一次登录时间不早于 (格式: YY/M，留空不过滤)")
            .validated(validate_login_threshold),
        Step::line("zip_label", "请输入压缩包命名标识")
            .default_value("ZTZ")
            .required(),
        Step::line("briefing", "请输入访谈提纲 (输入 END 结束，留空使用默认提纲)")
            .kind(StepKind::Multiline),
        Step::line("confirm", "确认以上配置并开始? (Y/n)")
            .default_value("y")
            .validated(validate_yes_no)
            .kind(StepKind::Confirm),
    ]
}

/// Builds the configuration from completed answers.
/// `None` when the operator declined at the confirmation step.
pub fn build_configuration(answers: &Answers) -> Result<Option<RunConfiguration>, AppError> {
    if !answers.flag("confirm") {
        return Ok(None);
    }

    let employers = parse_employers(answers.get("employers"));
    if employers.is_empty() {
        return Err(AppError::Validation("no employers given".to_string()));
    }
    let positions = parse_positions(answers.get("positions"));
    let stem = default_stem(answers.get("category"), &employers);

    let mut filename = answers.get("filename").trim().to_string();
    let generated = default_filename(&stem, &positions, EXTENSION);
    if filename.is_empty() {
        filename = generated.clone();
    }
    let suffix = format!(".{EXTENSION}");
    if !filename.to_lowercase().ends_with(&suffix) {
        filename.push_str(&suffix);
    }

    let min_tenure = answers.get("min_tenure").trim();
    let min_tenure_end = if min_tenure.eq_ignore_ascii_case(PRESENT) {
        PRESENT.to_string()
    } else {
        min_tenure.to_string()
    };

    let briefing = answers.get("briefing");
    let briefing_template = if briefing.trim().is_empty() {
        DEFAULT_BRIEFING_TEMPLATE.to_string()
    } else {
        briefing.to_string()
    };

    Ok(Some(RunConfiguration {
        category: answers.get("category").trim().to_string(),
        default_stem: (filename == generated).then_some(stem),
        employers,
        positions,
        briefing_template,
        view_phone: answers.flag("view_phone"),
        initials_only: answers.flag("initials"),
        min_tenure_end,
        min_last_login: parse_login_threshold(answers.get("min_login")),
        output_filename: filename,
        zip_label: answers.get("zip_label").trim().to_string(),
    }))
}

fn describe(answers: &Answers) -> String {
    let positions = answers.get("positions");
    let login = answers.get("min_login");
    format!(
        "配置确认\n  分类: {}\n  公司: {}\n  职位: {}\n  输出文件: {}\n  最早离职: {}\n  最早登录: {}\n  查看联系方式: {}\n  姓名缩写: {}\n  压缩包标识: {}",
        answers.get("category"),
        answers.get("employers"),
        if positions.is_empty() { "不限" } else { positions },
        answers.get("filename"),
        answers.get("min_tenure"),
        if login.is_empty() { "不过滤" } else { login },
        answers.get("view_phone"),
        answers.get("initials"),
        answers.get("zip_label"),
    )
}

/// Full interactive collection. `Ok(None)` when the operator declines.
pub fn collect_run_configuration(io: &mut dyn PromptIo) -> Result<Option<RunConfiguration>, AppError> {
    let mut steps = StepList::new(run_configuration_steps());
    run_steps(&mut steps, io)
        .ok_or_else(|| AppError::Validation("input closed before configuration was complete".to_string()))?;
    build_configuration(steps.answers())
}
