use crate::schema::{AccountType, LineRole, Term};
use crate::utils::{contains_phrase, normalize_label};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub term: Option<Term>,
    pub role: LineRole,
    /// Phrases recognised in row labels, matched as whole words.
    pub keywords: Vec<String>,
}

/// Balance sheet section markers: rows that only carry a heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Section {
    Assets,
    Liabilities,
    Equity,
}

impl Section {
    pub fn account_type(&self) -> AccountType {
        match self {
            Section::Assets => AccountType::Asset,
            Section::Liabilities => AccountType::Liability,
            Section::Equity => AccountType::Equity,
        }
    }

    pub fn code_prefix(&self) -> &'static str {
        match self {
            Section::Assets => "asset",
            Section::Liabilities => "liability",
            Section::Equity => "equity",
        }
    }
}

/// A section heading row, optionally narrowing the section to one term
/// (e.g. "IV. Долгосрочные обязательства").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeading {
    pub section: Section,
    pub term: Option<Term>,
}

const SECTION_MARKERS: &[(&str, Section, Option<Term>)] = &[
    ("assets", Section::Assets, None),
    ("asset", Section::Assets, None),
    ("актив", Section::Assets, None),
    ("current assets", Section::Assets, Some(Term::Current)),
    ("non current assets", Section::Assets, Some(Term::Noncurrent)),
    ("noncurrent assets", Section::Assets, Some(Term::Noncurrent)),
    ("оборотные активы", Section::Assets, Some(Term::Current)),
    ("внеоборотные активы", Section::Assets, Some(Term::Noncurrent)),
    ("liabilities", Section::Liabilities, None),
    ("пассив", Section::Liabilities, None),
    ("обязательства", Section::Liabilities, None),
    ("current liabilities", Section::Liabilities, Some(Term::Current)),
    ("short term liabilities", Section::Liabilities, Some(Term::Current)),
    ("non current liabilities", Section::Liabilities, Some(Term::Noncurrent)),
    ("noncurrent liabilities", Section::Liabilities, Some(Term::Noncurrent)),
    ("long term liabilities", Section::Liabilities, Some(Term::Noncurrent)),
    ("краткосрочные обязательства", Section::Liabilities, Some(Term::Current)),
    ("долгосрочные обязательства", Section::Liabilities, Some(Term::Noncurrent)),
    ("equity", Section::Equity, None),
    ("shareholders equity", Section::Equity, None),
    ("stockholders equity", Section::Equity, None),
    ("капитал и резервы", Section::Equity, None),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub entries: Vec<AccountEntry>,
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self::standard()
    }
}

impl ChartOfAccounts {
    /// The built-in chart used by the statement parsers, with English and
    /// Russian form labels.
    pub fn standard() -> Self {
        use AccountType::*;
        use LineRole::*;

        let bs = |code: &str,
                  name: &str,
                  account_type: AccountType,
                  term: Option<Term>,
                  role: LineRole,
                  keywords: &[&str]| AccountEntry {
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            term,
            role,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };
        let cur = Some(Term::Current);
        let non = Some(Term::Noncurrent);

        let entries = vec![
            // Assets
            bs("cash", "Cash and equivalents", Asset, cur, Detail,
                &["cash", "cash and cash equivalents", "cash at bank", "денежные средства"]),
            bs("short_term_investments", "Short-term investments", Asset, cur, Detail,
                &["short term investments", "финансовые вложения"]),
            bs("receivables", "Accounts receivable", Asset, cur, Detail,
                &["accounts receivable", "trade receivables", "receivables", "дебиторская задолженность"]),
            bs("inventory", "Inventory", Asset, cur, Detail,
                &["inventory", "inventories", "stock", "запасы"]),
            bs("other_current_assets", "Other current assets", Asset, cur, Detail,
                &["other current assets", "prepaid expenses", "прочие оборотные активы"]),
            bs("current_assets", "Total current assets", Asset, cur, Subtotal,
                &["current assets", "total current assets", "оборотные активы", "итого по разделу ii"]),
            bs("fixed_assets", "Property, plant and equipment", Asset, non, Detail,
                &["fixed assets", "property plant and equipment", "equipment", "основные средства"]),
            bs("intangible_assets", "Intangible assets", Asset, non, Detail,
                &["intangible assets", "goodwill", "нематериальные активы"]),
            bs("long_term_investments", "Long-term investments", Asset, non, Detail,
                &["long term investments", "долгосрочные финансовые вложения"]),
            bs("noncurrent_assets", "Total non-current assets", Asset, non, Subtotal,
                &["noncurrent assets", "non current assets", "total non current assets",
                  "total noncurrent assets", "long term assets", "внеоборотные активы",
                  "итого по разделу i"]),
            bs("total_assets", "Total assets", Asset, None, Total,
                &["total assets", "баланс актив", "итого активы"]),
            // Liabilities
            bs("payables", "Accounts payable", Liability, cur, Detail,
                &["accounts payable", "trade payables", "payables", "кредиторская задолженность"]),
            bs("short_term_debt", "Short-term borrowings", Liability, cur, Detail,
                &["short term debt", "short term borrowings", "short term loans",
                  "краткосрочные заемные средства"]),
            bs("accrued_liabilities", "Accrued liabilities", Liability, cur, Detail,
                &["accrued liabilities", "accrued expenses", "оценочные обязательства"]),
            bs("current_liabilities", "Total current liabilities", Liability, cur, Subtotal,
                &["current liabilities", "total current liabilities", "short term liabilities",
                  "краткосрочные обязательства", "итого по разделу v"]),
            bs("long_term_debt", "Long-term borrowings", Liability, non, Detail,
                &["long term debt", "long term borrowings", "long term loans",
                  "долгосрочные заемные средства"]),
            bs("noncurrent_liabilities", "Total non-current liabilities", Liability, non, Subtotal,
                &["noncurrent liabilities", "non current liabilities", "long term liabilities",
                  "total non current liabilities", "долгосрочные обязательства",
                  "итого по разделу iv"]),
            bs("total_liabilities", "Total liabilities", Liability, None, Total,
                &["total liabilities", "итого обязательства"]),
            // Equity
            bs("share_capital", "Share capital", Equity, None, Detail,
                &["share capital", "common stock", "charter capital", "уставный капитал"]),
            bs("retained_earnings", "Retained earnings", Equity, None, Detail,
                &["retained earnings", "accumulated deficit", "нераспределенная прибыль"]),
            bs("reserves", "Reserves", Equity, None, Detail,
                &["reserves", "additional paid in capital", "резервный капитал", "добавочный капитал"]),
            bs("total_equity", "Total equity", Equity, None, Total,
                &["total equity", "total shareholders equity", "итого капитал", "итого по разделу iii"]),
            bs("total_liabilities_and_equity", "Total liabilities and equity", Equity, None, Control,
                &["total liabilities and equity", "total equity and liabilities",
                  "total liabilities and shareholders equity", "баланс пассив"]),
            // Income statement
            bs("revenue", "Revenue", Revenue, None, Detail,
                &["revenue", "sales", "net sales", "turnover", "выручка"]),
            bs("cost_of_sales", "Cost of sales", CostOfSales, None, Detail,
                &["cost of sales", "cost of goods sold", "cogs", "себестоимость продаж", "себестоимость"]),
            bs("gross_profit", "Gross profit", Profit, None, Subtotal,
                &["gross profit", "валовая прибыль"]),
            bs("selling_expenses", "Selling expenses", OperatingExpense, None, Detail,
                &["selling expenses", "commercial expenses", "коммерческие расходы"]),
            bs("admin_expenses", "Administrative expenses", OperatingExpense, None, Detail,
                &["administrative expenses", "general and administrative expenses",
                  "управленческие расходы"]),
            bs("operating_expenses", "Operating expenses", OperatingExpense, None, Detail,
                &["operating expenses", "expenses", "opex", "расходы"]),
            bs("operating_profit", "Operating profit", Profit, None, Subtotal,
                &["operating profit", "operating income", "ebit", "прибыль от продаж"]),
            bs("interest_income", "Interest income", OtherIncome, None, Detail,
                &["interest income", "проценты к получению"]),
            bs("interest_expense", "Interest expense", OtherExpense, None, Detail,
                &["interest expense", "проценты к уплате"]),
            bs("other_income", "Other income", OtherIncome, None, Detail,
                &["other income", "прочие доходы"]),
            bs("other_expenses", "Other expenses", OtherExpense, None, Detail,
                &["other expenses", "прочие расходы"]),
            bs("profit_before_tax", "Profit before tax", Profit, None, Subtotal,
                &["profit before tax", "income before tax", "прибыль до налогообложения"]),
            bs("income_tax", "Income tax", IncomeTax, None, Detail,
                &["income tax", "tax expense", "налог на прибыль"]),
            bs("net_profit", "Net profit", Profit, None, Total,
                &["net profit", "net income", "net loss", "чистая прибыль", "чистый убыток"]),
        ];

        Self { entries }
    }

    /// Finds the entry whose keyword is the longest whole-word match inside
    /// `label`. Longest wins so that "non current assets" beats "current assets".
    pub fn lookup(&self, label: &str) -> Option<&AccountEntry> {
        self.lookup_where(label, |_| true)
    }

    pub fn lookup_where<F>(&self, label: &str, accept: F) -> Option<&AccountEntry>
    where
        F: Fn(&AccountEntry) -> bool,
    {
        let mut best: Option<(&AccountEntry, usize)> = None;
        for entry in self.entries.iter().filter(|e| accept(e)) {
            for keyword in &entry.keywords {
                if contains_phrase(label, keyword) {
                    let len = normalize_label(keyword).len();
                    if best.map_or(true, |(_, l)| len > l) {
                        best = Some((entry, len));
                    }
                }
            }
        }
        best.map(|(entry, _)| entry)
    }

    pub fn by_code(&self, code: &str) -> Option<&AccountEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    /// A row label that is exactly a section heading (e.g. "ASSETS",
    /// "III. Капитал и резервы").
    pub fn section_marker(label: &str) -> Option<Section> {
        Self::section_heading(label).map(|heading| heading.section)
    }

    /// Like `section_marker`, keeping the term a heading such as
    /// "V. Краткосрочные обязательства" implies.
    pub fn section_heading(label: &str) -> Option<SectionHeading> {
        let normalized = normalize_label(label);
        let stripped = strip_roman_prefix(&normalized);
        SECTION_MARKERS
            .iter()
            .find(|(marker, _, _)| stripped == *marker)
            .map(|(_, section, term)| SectionHeading {
                section: *section,
                term: *term,
            })
    }
}

fn strip_roman_prefix(label: &str) -> &str {
    match label.split_once(' ') {
        Some((head, rest))
            if !head.is_empty() && head.chars().all(|c| matches!(c, 'i' | 'v' | 'x')) =>
        {
            rest
        }
        _ => label,
    }
}
