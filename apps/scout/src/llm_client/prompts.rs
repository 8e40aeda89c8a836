// Prompt templates for the decision gateway.
// Placeholders: {briefing}, {resume}, {company}.

/// Fallback briefing used when the operator enters none. `__COMPANY__` is
/// replaced with the searched employer before the call.
pub const DEFAULT_BRIEFING_TEMPLATE: &str = "\
候选人需要在 __COMPANY__ 有实际工作经历，\
并且能够就其在 __COMPANY__ 期间负责的业务、团队与流程提供第一手信息。";

pub const CLASSIFY_PROMPT_TEMPLATE: &str = r#"你是一个专业的招聘/访谈助手。你的任务是判断一份简历是否符合访谈提纲的要求。
【访谈提纲】:
{briefing}
【候选人简历】:
{resume}
【你的任务】:
请仔细阅读提纲和简历，判断该候选人是否符合提纲中的核心要求。
请只回答 "YES" 或 "NO"。"#;

pub const SUMMARIZE_PROMPT_TEMPLATE: &str = r#"你是一位专业的简历分析师。
【简历全文】: {resume}
【目标公司】: {company}
任务: 1.定位目标公司经历(YY/M-YY/M或Present) 2.一句话总结 3.罗列其他经历
格式:
{company}的经历:
[在职时间] [公司名称] [职位]
[一句话总结]
其他工作经历:
[在职时间1] [公司名称1] [职位1]"#;

pub fn classify_prompt(briefing: &str, resume: &str) -> String {
    CLASSIFY_PROMPT_TEMPLATE
        .replace("{briefing}", briefing)
        .replace("{resume}", resume)
}

pub fn summarize_prompt(resume: &str, company: &str) -> String {
    SUMMARIZE_PROMPT_TEMPLATE
        .replace("{resume}", resume)
        .replace("{company}", company)
}
