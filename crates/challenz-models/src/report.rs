use crate::status::string_enum;
use crate::status::UnknownVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

string_enum!(
    /// Reason a user flagged a piece of content.
    ReportType, "report type", {
        Spam => "spam",
        Abuse => "abuse",
        Inappropriate => "inappropriate",
        Fraud => "fraud",
        Other => "other",
    }
);
