use serde::{Deserialize, Serialize};

/// Row of the `sign_descriptions` table, joined onto catalog entries.
#[derive(Deserialize, Debug, Clone)]
pub struct SignDescription {
    pub id: String,
    #[serde(default)]
    pub sign_type_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct NewSession<'a> {
    pub site_id: &'a str,
    pub session_name: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct SessionRow {
    pub id: String,
}
