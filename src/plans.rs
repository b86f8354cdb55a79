use chrono::{Days, Local, Months, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: u32,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub price: u32,
    pub currency: &'static str,
    pub frequency: &'static str,
    pub feature_text: &'static str,
    pub is_recommended: bool,
}

const PLAN_CATALOG: [Plan; 3] = [
    Plan {
        id: 1,
        title: "Plan 1",
        subtitle: "Por una semana",
        price: 70,
        currency: "MXN",
        frequency: "",
        feature_text: "Date a conocer por una semana",
        is_recommended: false,
    },
    Plan {
        id: 2,
        title: "Plan 2",
        subtitle: "Por un Mes",
        price: 150,
        currency: "",
        frequency: "/ month",
        feature_text: "Graba el anuncio en la mente de todos por un mes.",
        is_recommended: true,
    },
    Plan {
        id: 3,
        title: "Plan 3",
        subtitle: "Por cuatro meses",
        price: 250,
        currency: "",
        frequency: "/ month",
        feature_text: "Se más radical y haz que todos vean tu anuncio por 4 meses.",
        is_recommended: false,
    },
];

pub fn catalog() -> &'static [Plan] {
    &PLAN_CATALOG
}

pub fn find(id: u32) -> Option<&'static Plan> {
    PLAN_CATALOG.iter().find(|plan| plan.id == id)
}

/// How long an ad stays active under a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTerm {
    Days(u64),
    Months(u32),
}

impl PlanTerm {
    /// Unknown plan ids get the one-week term.
    pub fn for_plan(plan_id: u32) -> Self {
        match plan_id {
            2 => PlanTerm::Months(1),
            3 => PlanTerm::Months(4),
            _ => PlanTerm::Days(7),
        }
    }

    /// Month steps clamp to the last day of a shorter target month
    /// (Jan 31 + 1 month is Feb 28/29).
    pub fn end_from(self, start: NaiveDate) -> NaiveDate {
        let end = match self {
            PlanTerm::Days(days) => start.checked_add_days(Days::new(days)),
            PlanTerm::Months(months) => start.checked_add_months(Months::new(months)),
        };
        end.unwrap_or(NaiveDate::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanWindow {
    #[serde(with = "iso_date")]
    pub start: NaiveDate,
    #[serde(with = "iso_date")]
    pub end: NaiveDate,
}

impl PlanWindow {
    pub fn start_param(&self) -> String {
        self.start.format(iso_date::FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(iso_date::FORMAT).to_string()
    }
}

pub fn compute_window(plan_id: u32, today: NaiveDate) -> PlanWindow {
    PlanWindow {
        start: today,
        end: PlanTerm::for_plan(plan_id).end_from(today),
    }
}

/// Window starting on today's local calendar date.
pub fn compute_window_now(plan_id: u32) -> PlanWindow {
    compute_window(plan_id, Local::now().date_naive())
}

mod iso_date {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }
}
