use serde::{Deserialize, Serialize};

/// Column order of every spreadsheet this tool writes.
pub const COLUMNS: [&str; 12] = [
    "序号",
    "分类",
    "公司",
    "姓名",
    "在职公司",
    "职位",
    "云号码",
    "在职时间",
    "Profile",
    "简历链接",
    "是否合作",
    "最后一次登录时间",
];

pub const CONTACT_NOT_VIEWED: &str = "未查看";
pub const CONTACT_MANUAL: &str = "需手动查看";
pub const LOGIN_UNKNOWN: &str = "未知";
pub const COOPERATION_DEFAULT: &str = "否";

/// One qualified candidate of one run.
///
/// Every field is a plain `String` so spreadsheet rows stay rectangular:
/// a missing value is an empty string or one of the sentinels above, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub category: String,
    pub employer_searched: String,
    pub display_name: String,
    pub title: String,
    pub actual_employer: String,
    /// Canonical "YY/M-YY/M" or "YY/M-Present".
    pub tenure: String,
    pub contact: String,
    pub profile_url: String,
    pub summary: String,
    pub cooperation: String,
    /// Canonical "YYYY/MM/DD" or `LOGIN_UNKNOWN`.
    pub last_login: String,
}

impl CandidateRecord {
    /// Renders the record as a spreadsheet row in `COLUMNS` order.
    pub fn to_row(&self, sequence: usize) -> [String; 12] {
        [
            sequence.to_string(),
            self.category.clone(),
            self.employer_searched.clone(),
            self.display_name.clone(),
            self.actual_employer.clone(),
            self.title.clone(),
            self.contact.clone(),
            self.tenure.clone(),
            self.summary.clone(),
            self.profile_url.clone(),
            self.cooperation.clone(),
            self.last_login.clone(),
        ]
    }
}
