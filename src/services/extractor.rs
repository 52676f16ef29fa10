//! 报表抽取服务 - 业务能力层
//!
//! 把报表 HTML 转成学生档案和出勤记录。纯函数，不做 I/O，不返回错误：
//! 缺失或无法解析的字段降级为默认值，降级情况记录在 [`ExtractionReport`] 中。

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
pub use crate::models::{ExtractionReport, ProfileField};
use crate::models::{AttendanceRecord, RawDocument, StudentProfile};

/// 每行至少需要的单元格数量
pub const MIN_RECORD_CELLS: usize = 6;

/// 一次抽取的完整结果
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub profile: StudentProfile,
    pub records: Vec<AttendanceRecord>,
    pub report: ExtractionReport,
}

/// 报表抽取器
///
/// 选择器在构造时编译一次；无法编译的选择器视为字段缺失
pub struct Extractor {
    text_fields: Vec<(ProfileField, Option<Selector>)>,
    number_fields: Vec<(ProfileField, Option<Selector>)>,
    table: Option<Selector>,
}

impl Extractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        let text_fields = vec![
            (ProfileField::Name, id_selector(&config.name_id)),
            (ProfileField::Institution, id_selector(&config.institution_id)),
            (ProfileField::AcademicCareer, id_selector(&config.academic_career_id)),
            (ProfileField::Term, id_selector(&config.term_id)),
        ];
        let number_fields = vec![
            (
                ProfileField::TotalAttendancePercent,
                id_selector(&config.total_attendance_id),
            ),
            (
                ProfileField::MedicalAttendancePercent,
                id_selector(&config.medical_attendance_id),
            ),
            (
                ProfileField::OverallAttendancePercent,
                id_selector(&config.overall_attendance_id),
            ),
        ];

        let table = compile(&format!(
            "table[id*={}]",
            css_string(&config.table_id_fragment)
        ));

        Self {
            text_fields,
            number_fields,
            table,
        }
    }

    /// 抽取档案、记录和降级报告
    pub fn extract(&self, document: &RawDocument) -> Extraction {
        let html = Html::parse_document(&document.html);
        let mut report = ExtractionReport::default();

        let profile = self.profile_with_report(&html, &mut report);
        let records = self.records_with_report(&html, has_explicit_body(&document.html), &mut report);

        debug!(
            "[学号 {}] 抽取完成: {} 条记录, 降级: {}",
            document.key,
            records.len(),
            report.is_degraded()
        );

        Extraction {
            profile,
            records,
            report,
        }
    }

    pub fn extract_profile(&self, html: &Html) -> StudentProfile {
        self.profile_with_report(html, &mut ExtractionReport::default())
    }

    /// 解析后的文档看不出原始标记是否写了 tbody，这里按没写处理
    pub fn extract_records(&self, html: &Html) -> Vec<AttendanceRecord> {
        self.records_with_report(html, false, &mut ExtractionReport::default())
    }

    fn profile_with_report(&self, html: &Html, report: &mut ExtractionReport) -> StudentProfile {
        let mut profile = StudentProfile::default();

        for (field, selector) in &self.text_fields {
            let value = selector
                .as_ref()
                .and_then(|s| html.select(s).next())
                .map(element_text)
                .filter(|text| !text.is_empty());

            if value.is_none() {
                report.missing_fields.push(*field);
            }

            match field {
                ProfileField::Name => profile.name = value,
                ProfileField::Institution => profile.institution = value,
                ProfileField::AcademicCareer => profile.academic_career = value,
                ProfileField::Term => profile.term = value,
                _ => {}
            }
        }

        for (field, selector) in &self.number_fields {
            let value = match selector.as_ref().and_then(|s| html.select(s).next()) {
                None => {
                    report.missing_fields.push(*field);
                    None
                }
                Some(element) => {
                    let text = element_text(element);
                    match parse_percentage(&text) {
                        Some(v) => Some(v),
                        None => {
                            report.defaulted_fields.push(*field);
                            Some(0.0)
                        }
                    }
                }
            };

            match field {
                ProfileField::TotalAttendancePercent => profile.total_attendance_percent = value,
                ProfileField::MedicalAttendancePercent => {
                    profile.medical_attendance_percent = value
                }
                ProfileField::OverallAttendancePercent => {
                    profile.overall_attendance_percent = value
                }
                _ => {}
            }
        }

        profile
    }

    fn records_with_report(
        &self,
        html: &Html,
        explicit_body: bool,
        report: &mut ExtractionReport,
    ) -> Vec<AttendanceRecord> {
        let table = match self.table.as_ref().and_then(|s| html.select(s).next()) {
            Some(table) => table,
            None => {
                warn!("未找到出勤表");
                report.table_found = false;
                return Vec::new();
            }
        };
        report.table_found = true;

        let (has_head, rows) = table_rows(table);
        // 标记里既没有 tbody 也没有 thead 时，首行按位置视为表头
        let positional_header = !explicit_body && !has_head;
        let mut records = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            if index == 0 && (positional_header || is_header_row(row)) {
                continue;
            }

            let cells: Vec<String> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| cell.value().name() == "td")
                .map(element_text)
                .collect();

            if cells.len() < MIN_RECORD_CELLS {
                report.skipped_rows += 1;
                continue;
            }

            let attendance_percentage = match parse_percentage(&cells[5]) {
                Some(v) => v,
                None => {
                    report.defaulted_percentages += 1;
                    0.0
                }
            };

            records.push(AttendanceRecord {
                class_number: cells[0].clone(),
                class_title: cells[1].clone(),
                subject_catalog: cells[2].clone(),
                academic_career: cells[3].clone(),
                institution: cells[4].clone(),
                attendance_percentage,
            });
        }

        records
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

/// 解析百分比文本；非数字或非有限值返回 `None`
pub fn parse_percentage(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 表格自身的行（不含 thead/tfoot 与嵌套表格），以及是否存在 thead
fn table_rows(table: ElementRef<'_>) -> (bool, Vec<ElementRef<'_>>) {
    let mut has_head = false;
    let mut rows = Vec::new();

    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "thead" => has_head = true,
            "tbody" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|row| row.value().name() == "tr"),
            ),
            "tr" => rows.push(child),
            _ => {}
        }
    }

    (has_head, rows)
}

/// 只由 `th` 组成的行
fn is_header_row(row: ElementRef<'_>) -> bool {
    let mut cells = row.children().filter_map(ElementRef::wrap).peekable();
    cells.peek().is_some() && cells.all(|cell| cell.value().name() == "th")
}

/// html5ever 解析时总会补出 tbody，所以只能看原始文本
fn has_explicit_body(markup: &str) -> bool {
    markup.to_ascii_lowercase().contains("<tbody")
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// 按 id 精确匹配的选择器；门户的 id 里常有 `$` 之类的字符，所以用属性选择器
fn id_selector(id: &str) -> Option<Selector> {
    compile(&format!("[id={}]", css_string(id)))
}

fn compile(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("无法编译选择器 '{}': {:?}", selector, e);
            None
        }
    }
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrameChoice, JobKey};

    const REPORT: &str = r#"
        <html><body>
          <span id="PERSONAL_DTSAVW_NAME"> Asha Verma </span>
          <span id="INSTITUTION_TBL_DESCR">Inst X</span>
          <span id="ACAD_CAR_TBL_DESCR">Undergraduate</span>
          <span id="TERM_VAL_TBL_DESCR">Semester 1 year 2501 UG/PG</span>
          <span id="SRM_LEAVE_WRK_AMOUNT_DUE">85.5</span>
          <span id="SRM_LEAVE_WRK_AMOUNT_DIFF">90</span>
          <span id="SRM_CLAS_PER_DR_TOTAL_PERCENT">87.5</span>
          <table id="STDNT_ENRL_SSVW$scroll$0">
            <tr><th>Class Nbr</th><th>Title</th><th>Subject</th><th>Career</th><th>Institution</th><th>%</th></tr>
            <tr><td>CS101</td><td>Data Analytics</td><td>CS BCS-052</td><td>Undergraduate</td><td>Inst X</td><td>88.5</td></tr>
            <tr><td>CS102</td><td>ML</td><td>CS BCS-055</td><td>Undergraduate</td><td>Inst X</td><td>bad</td></tr>
          </table>
        </body></html>
    "#;

    fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    const HEADER_ROW: &str = "<tr><th>Class Nbr</th><th>Title</th><th>Subject</th><th>Career</th><th>Institution</th><th>%</th></tr>";

    fn table_html(rows: &str) -> String {
        format!("<html><body><table id=\"STDNT_ENRL$0\">{}</table></body></html>", rows)
    }

    fn raw(html: &str) -> RawDocument {
        RawDocument::new(JobKey::new("BE23CS060"), html, FrameChoice::Named)
    }

    #[test]
    fn test_records_scenario_with_malformed_percentage() {
        let records = Extractor::default().extract_records(&parse(REPORT));

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            AttendanceRecord {
                class_number: "CS101".to_string(),
                class_title: "Data Analytics".to_string(),
                subject_catalog: "CS BCS-052".to_string(),
                academic_career: "Undergraduate".to_string(),
                institution: "Inst X".to_string(),
                attendance_percentage: 88.5,
            }
        );
        assert_eq!(records[1].class_number, "CS102");
        assert_eq!(records[1].attendance_percentage, 0.0);
    }

    #[test]
    fn test_full_profile() {
        let profile = Extractor::default().extract_profile(&parse(REPORT));

        assert_eq!(profile.name.as_deref(), Some("Asha Verma"));
        assert_eq!(profile.institution.as_deref(), Some("Inst X"));
        assert_eq!(profile.academic_career.as_deref(), Some("Undergraduate"));
        assert_eq!(profile.term.as_deref(), Some("Semester 1 year 2501 UG/PG"));
        assert_eq!(profile.total_attendance_percent, Some(85.5));
        assert_eq!(profile.medical_attendance_percent, Some(90.0));
        assert_eq!(profile.overall_attendance_percent, Some(87.5));
    }

    #[test]
    fn test_missing_term_leaves_other_fields() {
        let html = r#"
            <span id="PERSONAL_DTSAVW_NAME">Asha Verma</span>
            <span id="INSTITUTION_TBL_DESCR">Inst X</span>
        "#;
        let profile = Extractor::default().extract_profile(&parse(html));

        assert_eq!(profile.name.as_deref(), Some("Asha Verma"));
        assert_eq!(profile.institution.as_deref(), Some("Inst X"));
        assert_eq!(profile.term, None);
        assert_eq!(profile.total_attendance_percent, None);
    }

    #[test]
    fn test_unparsable_number_is_zero_not_absent() {
        let html = r#"
            <span id="SRM_LEAVE_WRK_AMOUNT_DUE">N/A</span>
            <span id="SRM_LEAVE_WRK_AMOUNT_DIFF"></span>
        "#;
        let profile = Extractor::default().extract_profile(&parse(html));

        assert_eq!(profile.total_attendance_percent, Some(0.0));
        assert_eq!(profile.medical_attendance_percent, Some(0.0));
        assert_eq!(profile.overall_attendance_percent, None);
    }

    #[test]
    fn test_short_rows_are_skipped_and_processing_continues() {
        let html = table_html(&format!(
            "{}<tr><td>CS100</td><td>Orientation</td></tr>\
             <tr><td>CS101</td><td>Data Analytics</td><td>CS BCS-052</td><td>Undergraduate</td><td>Inst X</td><td>88.5</td></tr>\
             <tr><td colspan=\"6\">No more rows</td></tr>\
             <tr><td>CS103</td><td>DBMS</td><td>CS BCS-501</td><td>Undergraduate</td><td>Inst X</td><td>75.5</td><td>extra</td></tr>",
            HEADER_ROW
        ));
        let mut report = ExtractionReport::default();
        let records = Extractor::default().records_with_report(&parse(&html), false, &mut report);

        let numbers: Vec<&str> = records.iter().map(|r| r.class_number.as_str()).collect();
        assert_eq!(numbers, vec!["CS101", "CS103"]);
        assert_eq!(report.skipped_rows, 2);
    }

    #[test]
    fn test_explicit_tbody_and_thead() {
        let html = table_html(
            "<thead><tr><td>Class Nbr</td><td>Title</td><td>Subject</td><td>Career</td><td>Institution</td><td>%</td></tr></thead>\
             <tbody>\
               <tr><td>CS101</td><td>Data Analytics</td><td>CS BCS-052</td><td>Undergraduate</td><td>Inst X</td><td>88.5</td></tr>\
               <tr><td>CS102</td><td>ML</td><td>CS BCS-055</td><td>Undergraduate</td><td>Inst X</td><td>92</td></tr>\
             </tbody>",
        );
        let records = Extractor::default().extract_records(&parse(&html));

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].attendance_percentage, 92.0);
    }

    #[test]
    fn test_first_row_without_body_is_header_even_with_td_cells() {
        let html = table_html(
            "<tr><td>Class Nbr</td><td>Class Title</td><td>Subject / Catalog</td><td>Academic Career</td><td>Institution</td><td>Attendance %</td></tr>\
             <tr><td>CS101</td><td>Data Analytics</td><td>CS BCS-052</td><td>Undergraduate</td><td>Inst X</td><td>88.5</td></tr>",
        );

        let records = Extractor::default().extract_records(&parse(&html));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].class_number, "CS101");

        let extraction = Extractor::default().extract(&raw(&html));
        assert_eq!(extraction.records, records);
        assert_eq!(extraction.report.skipped_rows, 0);
        assert_eq!(extraction.report.defaulted_percentages, 0);
    }

    #[test]
    fn test_explicit_tbody_rows_are_all_data() {
        let html = table_html(
            "<TBODY><tr><td>CS101</td><td>Test Subject</td><td>CS-101</td><td>Undergraduate</td><td>Test Institution</td><td>88.5</td></tr></TBODY>",
        );
        let extraction = Extractor::default().extract(&raw(&html));

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].attendance_percentage, 88.5);
    }

    #[test]
    fn test_explicit_tbody_skips_leading_th_row_only() {
        let html = table_html(&format!(
            "<tbody>{}<tr><td>CS101</td><td>Data Analytics</td><td>CS BCS-052</td><td>Undergraduate</td><td>Inst X</td><td>88.5</td></tr></tbody>",
            HEADER_ROW
        ));
        let extraction = Extractor::default().extract(&raw(&html));

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.report.skipped_rows, 0);
    }

    #[test]
    fn test_table_id_suffix_varies() {
        let html = "<table id=\"DERIVED_STDNT_ENRL_2510\">\
            <tr><th>Class Nbr</th><th>Title</th><th>Subject</th><th>Career</th><th>Institution</th><th>%</th></tr>\
            <tr><td>CS101</td><td>Data Analytics</td><td>CS BCS-052</td><td>Undergraduate</td><td>Inst X</td><td> 88.5 </td></tr>\
            </table>";
        let records = Extractor::default().extract_records(&parse(html));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attendance_percentage, 88.5);
    }

    #[test]
    fn test_nested_cell_markup() {
        let html = table_html(&format!(
            "{}<tr><td><span>CS101</span></td><td><a href=\"#\">Data Analytics</a></td><td>CS BCS-052</td>\
             <td>Undergraduate</td><td>Inst X</td><td><span>88.5</span></td></tr>",
            HEADER_ROW
        ));
        let records = Extractor::default().extract_records(&parse(&html));

        assert_eq!(records[0].class_title, "Data Analytics");
        assert_eq!(records[0].attendance_percentage, 88.5);
    }

    #[test]
    fn test_malformed_percentages_are_exactly_zero() {
        for text in ["bad", "", "88.5%", "NaN", "inf", "--", "12,5"] {
            assert_eq!(parse_percentage(text).unwrap_or(0.0), 0.0, "输入: {:?}", text);
        }
        assert_eq!(parse_percentage(" 75.25 "), Some(75.25));
    }

    #[test]
    fn test_no_table_yields_no_records() {
        let extraction = Extractor::default().extract(&raw("<html><body></body></html>"));

        assert!(extraction.records.is_empty());
        assert!(!extraction.report.table_found);
        assert!(extraction.report.is_degraded());
        assert_eq!(extraction.report.missing_fields.len(), 7);
    }

    #[test]
    fn test_report_lists_degraded_fields() {
        let extraction = Extractor::default().extract(&raw(REPORT));

        assert!(extraction.report.missing_fields.is_empty());
        assert!(extraction.report.defaulted_fields.is_empty());
        assert_eq!(extraction.report.defaulted_percentages, 1);
        assert!(extraction.report.table_found);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let document = raw(REPORT);
        let extractor = Extractor::default();

        let first = extractor.extract(&document);
        let second = extractor.extract(&document);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.records).unwrap(),
            serde_json::to_string(&second.records).unwrap()
        );
    }

    #[test]
    fn test_configured_ids_are_used() {
        let config = ExtractorConfig {
            name_id: "STUDENT$NAME".to_string(),
            table_id_fragment: "ATTEND_GRID".to_string(),
            ..Default::default()
        };
        let html = "<span id=\"STUDENT$NAME\">Asha</span>\
            <table id=\"ATTEND_GRID$0\"><tr><td>No</td><td>Title</td><td>Subject</td><td>Career</td><td>Inst</td><td>%</td></tr>\
            <tr><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td><td>60</td></tr></table>";
        let extractor = Extractor::new(&config);
        let doc = parse(html);

        assert_eq!(extractor.extract_profile(&doc).name.as_deref(), Some("Asha"));
        assert_eq!(extractor.extract_records(&doc).len(), 1);
    }
}
