use anyhow::Result;
use financial_health_engine::*;
use std::collections::BTreeSet;

fn doc(name: &str, csv: &str) -> InputDocument {
    InputDocument::new(name, csv)
}

fn kinds(report: &HealthReport) -> Vec<DiagnosticKind> {
    report.diagnostics.iter().map(|d| d.kind).collect()
}

const INCOME_STATEMENT: &str = "Income Statement\nAmounts in thousands\nLine item,2023-03\nRevenue,1000\nCost of sales,600\nGross profit,400\nAdministrative expenses,250\nNet profit,150\n";

const BALANCE_SHEET: &str = "Balance Sheet\nAmounts in thousands\nLine item,2023-02,2023-03\nAssets\nCash,150,200\nInventory,100,100\nReceivables,150,200\nTotal current assets,400,500\nFixed assets,500,500\nTotal assets,900,1000\nLiabilities\nAccounts payable,250,250\nTotal current liabilities,250,250\nLong-term debt,250,250\nTotal liabilities,500,500\nEquity\nShare capital,300,300\nRetained earnings,100,200\nTotal equity,400,500\n";

const LEDGER: &str = "Cash flow ledger\nAccount,Counterparty,2023-01,2023-02,2023-03\n1010,Acme,900,1000,1100\n1020,Staff,-300,-300,-300\n2010,Vendor,-200,,\n6210,Acme,1000,-900,1100\n6010,Supplier,400,-400,300\n";

const TRIAL_BALANCE: &str = "Trial Balance\nPeriod: 2023-03\nAccount,Name,Debit,Credit\n1010,Cash,500,\n3010,Share capital,,500\n";

const DEALS: &str = "Deal register\nDeal ID,Counterparty,Period,Amount\nD-1,Acme,2023-01,1000\nD-2,ACME,2023-02,1000\nD-3,Initech,2023-03,500\n";

const FORM_1: &str = "Бухгалтерский баланс
Показатель;Код;31.12.2023
I. ВНЕОБОРОТНЫЕ АКТИВЫ
Основные средства;1150;600
Итого по разделу I;1100;600
II. ОБОРОТНЫЕ АКТИВЫ
Запасы;1210;150
Дебиторская задолженность;1230;150
Денежные средства;1250;100
Итого по разделу II;1200;400
БАЛАНС;1600;1000
III. КАПИТАЛ И РЕЗЕРВЫ
Уставный капитал;1310;100
Нераспределенная прибыль;1370;300
Итого по разделу III;1300;400
IV. ДОЛГОСРОЧНЫЕ ОБЯЗАТЕЛЬСТВА
Заемные средства;1410;150
Прочие обязательства;1450;50
Итого по разделу IV;1400;200
V. КРАТКОСРОЧНЫЕ ОБЯЗАТЕЛЬСТВА
Заемные средства;1510;100
Кредиторская задолженность;1520;300
Итого по разделу V;1500;400
БАЛАНС;1700;1000
";

fn full_set() -> Vec<InputDocument> {
    vec![
        doc("pnl.csv", INCOME_STATEMENT),
        doc("balance.csv", BALANCE_SHEET),
        doc("ledger.csv", LEDGER),
        doc("tb.csv", TRIAL_BALANCE),
        doc("deals.csv", DEALS),
    ]
}

#[test]
fn test_scenario_a_net_profit_from_signed_lines() -> Result<()> {
    let report = analyze_documents(
        &[doc("pnl.csv", "Income Statement\nLine item,2023-03\nRevenue,1000\nExpenses,-600\n")],
        &AnalysisConfig::default(),
    )?;
    let p = Period::parse("2023-03")?;
    let profitability = report
        .analyses
        .get(AnalysisDimension::Profitability)
        .expect("profitability computed");
    assert_eq!(
        profitability.metric(&p, "net_profit"),
        Some(MetricValue::Defined(400.0))
    );
    Ok(())
}

#[test]
fn test_scenario_b_balanced_sheet() -> Result<()> {
    let report = analyze_documents(
        &[doc(
            "bs.csv",
            "Balance Sheet\nLine item,2023-03\nTotal assets,500\nTotal liabilities,300\nTotal equity,200\n",
        )],
        &AnalysisConfig::default(),
    )?;
    let bs = report.model.statement(DocumentType::BalanceSheet).expect("balance sheet");
    assert!(bs.balance_mismatches().is_empty());
    assert!(!kinds(&report).contains(&DiagnosticKind::BalanceMismatch));
    Ok(())
}

#[test]
fn test_scenario_c_balance_mismatch() -> Result<()> {
    let report = analyze_documents(
        &[doc(
            "bs.csv",
            "Balance Sheet\nLine item,2023-03\nTotal assets,500\nTotal liabilities,300\nTotal equity,150\n",
        )],
        &AnalysisConfig::default(),
    )?;
    let bs = report.model.statement(DocumentType::BalanceSheet).expect("balance sheet");
    let mismatches = bs.balance_mismatches();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].period, Period::parse("2023-03")?);
    assert_eq!(mismatches[0].difference, 50.0);

    let mismatch = report
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::BalanceMismatch)
        .expect("mismatch diagnostic");
    assert_eq!(mismatch.severity, Severity::Warning);
    assert!(report
        .analyses
        .get(AnalysisDimension::Balance)
        .is_some_and(|b| b.has_flag("balance_mismatch")));
    Ok(())
}

#[test]
fn test_scenario_d_malformed_row_keeps_siblings() -> Result<()> {
    let report = analyze_documents(
        &[doc(
            "tb.csv",
            "Trial Balance\nPeriod: 2023-03\nAccount,Debit,Credit\n1010,100,50\n1020,200,\n3010,,200\n",
        )],
        &AnalysisConfig::default(),
    )?;
    let malformed: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::MalformedRow)
        .collect();
    assert_eq!(malformed.len(), 1);
    assert_eq!(malformed[0].document.as_deref(), Some("tb.csv"));
    assert_eq!(malformed[0].row, Some(4));

    let tb = report.model.statement(DocumentType::TrialBalance).expect("trial balance");
    assert_eq!(tb.len(), 2);
    Ok(())
}

#[test]
fn test_scenario_e_period_conflict_withholds_statement() -> Result<()> {
    let report = analyze_documents(
        &[
            doc("bs_a.csv", "Balance Sheet\nLine item,2023-03\nAssets\nCash,100\n"),
            doc("bs_b.csv", "Balance Sheet\nLine item,2023-03\nAssets\nCash,120\n"),
            doc("pnl.csv", "Income Statement\nLine item,2023-03\nRevenue,1000\nExpenses,-600\n"),
        ],
        &AnalysisConfig::default(),
    )?;

    assert!(kinds(&report).contains(&DiagnosticKind::PeriodConflict));
    assert_eq!(report.model.conflicts.len(), 1);
    let conflict = &report.model.conflicts[0];
    assert_eq!(conflict.key, "cash");
    assert_eq!((conflict.first, conflict.second), (100.0, 120.0));

    assert!(report.model.is_withheld(DocumentType::BalanceSheet));
    assert!(report.model.statement(DocumentType::BalanceSheet).is_none());
    assert!(report.analyses.get(AnalysisDimension::Balance).is_none());
    assert!(report.analyses.get(AnalysisDimension::Profitability).is_some());
    Ok(())
}

#[test]
fn test_parsing_is_idempotent() -> Result<()> {
    for (name, csv) in [
        ("pnl.csv", INCOME_STATEMENT),
        ("balance.csv", BALANCE_SHEET),
        ("ledger.csv", LEDGER),
        ("tb.csv", TRIAL_BALANCE),
        ("deals.csv", DEALS),
    ] {
        let first = ingest(&doc(name, csv))?;
        let second = ingest(&doc(name, csv))?;
        assert_eq!(first.items, second.items, "{} parsed differently", name);
        assert_eq!(first.diagnostics, second.diagnostics);
    }
    Ok(())
}

#[test]
fn test_detection_is_deterministic() -> Result<()> {
    let expected = [
        (INCOME_STATEMENT, DocumentType::IncomeStatement),
        (BALANCE_SHEET, DocumentType::BalanceSheet),
        (LEDGER, DocumentType::CashflowLedger),
        (TRIAL_BALANCE, DocumentType::TrialBalance),
        (DEALS, DocumentType::DealRegister),
    ];
    for (csv, document_type) in expected {
        let table = read_table("doc.csv", csv.as_bytes())?;
        let first = detect(&table)?;
        assert_eq!(first.document_type, document_type);
        assert_eq!(first, detect(&table)?);
    }
    Ok(())
}

#[test]
fn test_statements_have_unique_keys() -> Result<()> {
    let mut documents = full_set();
    documents.push(doc("balance_copy.csv", BALANCE_SHEET));
    let report = analyze_documents(&documents, &AnalysisConfig::default())?;

    assert!(report.model.conflicts.is_empty());
    for statement in report.model.statements.values() {
        let keys: BTreeSet<(LineKey, Period)> = statement
            .items()
            .map(|i| (i.key.clone(), i.period))
            .collect();
        assert_eq!(keys.len(), statement.len());
    }

    let single = analyze_documents(&[doc("balance.csv", BALANCE_SHEET)], &AnalysisConfig::default())?;
    assert_eq!(
        report.model.statement(DocumentType::BalanceSheet).map(|s| s.len()),
        single.model.statement(DocumentType::BalanceSheet).map(|s| s.len())
    );
    Ok(())
}

#[test]
fn test_every_balance_sheet_period_balances_or_is_flagged() -> Result<()> {
    let config = AnalysisConfig::default();
    let report = analyze_documents(
        &[doc(
            "bs.csv",
            "Balance Sheet\nLine item,2022,2023\nTotal assets,500,520\nTotal liabilities,300,300\nTotal equity,200,150\n",
        )],
        &config,
    )?;
    let bs = report.model.statement(DocumentType::BalanceSheet).expect("balance sheet");
    let checker = BalanceChecker::new(config.balance_tolerance);
    let flagged: BTreeSet<Period> = bs.balance_mismatches().iter().map(|m| m.period).collect();

    for period in bs.periods() {
        let totals = checker.totals(bs, &period);
        let difference = totals.assets.unwrap_or(0.0)
            - (totals.liabilities.unwrap_or(0.0) + totals.equity.unwrap_or(0.0));
        assert!(difference.abs() <= config.balance_tolerance || flagged.contains(&period));
    }
    assert_eq!(flagged.len(), 1);
    Ok(())
}

#[test]
fn test_unit_scale_markers_rescale_documents() -> Result<()> {
    let report = analyze_documents(&full_set(), &AnalysisConfig::default())?;
    let is = report
        .model
        .statement(DocumentType::IncomeStatement)
        .expect("income statement");
    assert_eq!(is.value("revenue", &Period::parse("2023-03")?), Some(1_000_000.0));
    Ok(())
}

#[test]
fn test_zero_denominator_is_undefined_not_infinite() -> Result<()> {
    let report = analyze_documents(
        &[doc(
            "bs.csv",
            "Balance Sheet\nLine item,2023\nAssets\nCash,100\nTotal current assets,100\nTotal assets,100\nLiabilities\nTotal current liabilities,0\nTotal liabilities,0\nEquity\nTotal equity,100\n",
        )],
        &AnalysisConfig::default(),
    )?;
    let balance = report.analyses.get(AnalysisDimension::Balance).expect("balance");
    assert_eq!(
        balance.metric(&Period::year(2023), "current_ratio"),
        Some(MetricValue::Undefined(UndefinedReason::ZeroDenominator))
    );
    for metrics in balance.periods.values() {
        assert!(metrics
            .values()
            .filter_map(|m| m.value())
            .all(|v| v.is_finite()));
    }
    assert!(report.to_json()?.contains("zero_denominator"));
    Ok(())
}

#[test]
fn test_raising_weight_of_improving_metric_never_lowers_score() -> Result<()> {
    let mut balance = AnalysisResult::new(AnalysisDimension::Balance);
    balance.set(Period::year(2022), "current_ratio", MetricValue::Defined(1.2));
    balance.set(Period::year(2023), "current_ratio", MetricValue::Defined(2.5));
    let mut profitability = AnalysisResult::new(AnalysisDimension::Profitability);
    profitability.set(Period::year(2023), "net_margin", MetricValue::Defined(0.05));

    let mut analyses = AnalysisSet::default();
    analyses.insert(balance);
    analyses.insert(profitability);

    let rule = |dimension, metric: &str, weight, worst, best| ScoringRule {
        dimension,
        metric: metric.to_string(),
        weight,
        curve: NormalizationCurve::new(worst, best),
    };
    let mut config = ScoringConfig {
        rules: vec![
            rule(AnalysisDimension::Balance, "current_ratio", 50.0, 0.8, 2.0),
            rule(AnalysisDimension::Profitability, "net_margin", 50.0, 0.0, 0.15),
        ],
        ..ScoringConfig::default()
    };

    let before = score(&analyses, &config)?.total;
    config.rules[0].weight = 70.0;
    let after = score(&analyses, &config)?.total;
    assert!(after >= before, "{} < {}", after, before);
    Ok(())
}

#[test]
fn test_bad_document_does_not_block_the_rest() -> Result<()> {
    let report = analyze_documents(
        &[
            doc("scan.pdf.txt", "%PDF-1.4 binary garbage"),
            doc("pnl.csv", "Income Statement\nLine item,2023-03\nRevenue,1000\nExpenses,-600\n"),
        ],
        &AnalysisConfig::default(),
    )?;

    let unrecognized = report
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::UnrecognizedFormat)
        .expect("unrecognized document reported");
    assert_eq!(unrecognized.document.as_deref(), Some("scan.pdf.txt"));
    assert!(report.analyses.get(AnalysisDimension::Profitability).is_some());
    assert!(report.score.is_some());
    Ok(())
}

#[test]
fn test_full_document_set() -> Result<()> {
    let report = analyze_documents(&full_set(), &AnalysisConfig::default())?;

    assert!(!report.has_errors(), "{:?}", report.diagnostics);
    assert_eq!(report.model.statements.len(), 5);
    assert_eq!(report.analyses.results.len(), 6);
    assert_eq!(
        report.model.as_of(),
        Some(Period::parse("2023-03")?)
    );

    let deals = report
        .analyses
        .get(AnalysisDimension::DealRetrospective)
        .expect("deal retrospective");
    assert!(deals
        .flags
        .iter()
        .any(|f| f.code == "unrealized" && f.subject.as_deref() == Some("D-3")));
    // Only cash accounts realize deals: 900 in Jan and 1000 in Feb against 2500 planned.
    assert_eq!(
        deals.summary["realization_rate"],
        MetricValue::Defined(1900.0 / 2500.0)
    );
    let jan = Period::parse("2023-01")?;
    assert_eq!(deals.metric(&jan, "realized"), Some(MetricValue::Defined(900.0)));

    let receivables = report
        .analyses
        .get(AnalysisDimension::Receivables)
        .expect("receivables");
    // 1000 accrued in Jan, 900 settled in Feb, 1100 accrued in Mar.
    assert_eq!(receivables.summary["outstanding"], MetricValue::Defined(1200.0));
    assert_eq!(receivables.summary["aging_31_60"], MetricValue::Defined(100.0));
    assert_eq!(receivables.summary["aging_0_30"], MetricValue::Defined(1100.0));

    let score = report.score.expect("score");
    assert!(score.missing.is_empty(), "missing: {:?}", score.missing);
    assert_eq!(score.components.len(), 10);
    assert!((0.0..=100.0).contains(&score.total));
    assert_eq!(score.band, AnalysisConfig::default().scoring.band_for(score.total));
    Ok(())
}

#[test]
fn test_document_order_does_not_matter() -> Result<()> {
    let config = AnalysisConfig::default();
    let forward = analyze_documents(&full_set(), &config)?;
    let mut reversed_docs = full_set();
    reversed_docs.reverse();
    let reversed = analyze_documents(&reversed_docs, &config)?;

    assert_eq!(forward.model, reversed.model);
    assert_eq!(forward.analyses, reversed.analyses);
    assert_eq!(forward.score, reversed.score);
    Ok(())
}

#[test]
fn test_config_round_trip_and_validation() -> Result<()> {
    let config = AnalysisConfig::default();
    let json = config.to_json()?;
    assert_eq!(AnalysisConfig::from_json(&json)?, config);

    let broken = json.replace("\"rolling_window\": 3", "\"rolling_window\": 0");
    assert!(matches!(
        AnalysisConfig::from_json(&broken),
        Err(FinancialHealthError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_schema_generation() -> Result<()> {
    let schema_json = HealthReport::schema_as_json()?;

    assert!(schema_json.contains("diagnostics"));
    assert!(schema_json.contains("CanonicalModel"));
    assert!(schema_json.contains("AnalysisResult"));
    assert!(schema_json.contains("RiskBand"));

    let config_schema = serde_json::to_string(&AnalysisConfig::generate_json_schema())?;
    assert!(config_schema.contains("bucket_boundaries_days"));
    Ok(())
}

#[test]
fn test_russian_form_with_all_five_sections() -> Result<()> {
    let report = analyze_documents(&[doc("form1.csv", FORM_1)], &AnalysisConfig::default())?;

    assert!(!kinds(&report).contains(&DiagnosticKind::MalformedRow));
    assert!(!kinds(&report).contains(&DiagnosticKind::BalanceMismatch));
    assert!(!kinds(&report).contains(&DiagnosticKind::UnrecognizedLabel));

    let bs = report.model.statement(DocumentType::BalanceSheet).expect("balance sheet");
    assert!(bs.balance_mismatches().is_empty());
    let p = Period::parse("31.12.2023")?;
    assert_eq!(bs.value("liability:1410", &p), Some(150.0));
    assert_eq!(bs.value("liability:1510", &p), Some(100.0));

    let balance = report
        .analyses
        .get(AnalysisDimension::Balance)
        .expect("balance analysis");
    assert_eq!(balance.metric(&p, "equity_ratio"), Some(MetricValue::Defined(0.4)));
    assert_eq!(balance.metric(&p, "debt_to_equity"), Some(MetricValue::Defined(1.5)));
    assert_eq!(balance.metric(&p, "current_ratio"), Some(MetricValue::Defined(1.0)));
    Ok(())
}

#[test]
fn test_receivables_age_to_the_end_of_the_ledger() -> Result<()> {
    let ledger = "Cash flow ledger\nAccount,Counterparty,2023-01,2023-02,2023-03,2023-04,2023-05,2023-06\n1010,Bank,100,100,100,100,100,100\n6210,Acme,100,,,,,\n";
    let report = analyze_documents(&[doc("ledger.csv", ledger)], &AnalysisConfig::default())?;

    let receivables = report
        .analyses
        .get(AnalysisDimension::Receivables)
        .expect("receivables");
    assert_eq!(receivables.summary["aging_over_90"], MetricValue::Defined(100.0));
    assert!(receivables.has_flag("aging_threshold_exceeded"));
    Ok(())
}

#[test]
fn test_receivable_accruals_never_realize_a_deal() -> Result<()> {
    let report = analyze_documents(
        &[
            doc(
                "ledger.csv",
                "Cash flow ledger\nAccount,Counterparty,2023-01\n1010,Acme,1000\n6210,Acme,1000\n",
            ),
            doc(
                "deals.csv",
                "Deal register\nDeal ID,Counterparty,Period,Amount\nD-1,Acme,2023-01,1000\n",
            ),
        ],
        &AnalysisConfig::default(),
    )?;
    let deals = report
        .analyses
        .get(AnalysisDimension::DealRetrospective)
        .expect("deal retrospective");
    let jan = Period::parse("2023-01")?;
    assert_eq!(deals.metric(&jan, "realized"), Some(MetricValue::Defined(1000.0)));
    assert_eq!(deals.summary["realization_rate"], MetricValue::Defined(1.0));
    Ok(())
}
