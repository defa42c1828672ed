// ==========================================
// 文件格式集成测试
// ==========================================
// 覆盖: CSV / JSON / XML 识别与解析、模板回读、文件级告警

use crm_lead_import::domain::types::{FileFormat, ImportPhase};
use chrono::NaiveDate;
use crm_lead_import::domain::InternalField;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use std::sync::Arc;

mod test_helpers;
use test_helpers::{
    build_api, test_settings, test_tenant, upload_to_preview, wait_for_phase, MemoryLeadStore,
};

#[tokio::test]
async fn test_json_array_is_detected_and_mapped() {
    let api = build_api(Arc::new(MemoryLeadStore::new()), test_settings(10, 2));

    let bytes = br#"{"exportado": "2024-05-01", "clientes": [
        {"nombre": "Ana", "telefono": "555-1", "empresa": "Acme", "estado": "Contactado"},
        {"nombre": "Luis", "telefono": "555-2"}
    ]}"#
    .to_vec();
    let job_id = upload_to_preview(&api, "clientes.json", bytes).await;

    assert_eq!(api.job(&job_id).unwrap().format, Some(FileFormat::Json));
    let columns: Vec<String> = api
        .columns(&job_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(columns, vec!["nombre", "telefono", "empresa", "estado"]);

    let preview = api.preview(&job_id).await.unwrap();
    assert_eq!(preview.total_rows, 2);
    assert_eq!(preview.valid_leads, 2);
    assert_eq!(preview.sample[0].company.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_xml_records_are_detected_without_extension() {
    let api = build_api(Arc::new(MemoryLeadStore::new()), test_settings(10, 2));

    let bytes = br#"<?xml version="1.0" encoding="UTF-8"?>
        <leads>
          <lead><name>Ana</name><phone>555-1</phone><email>ana@x.com</email></lead>
          <lead><name>Luis</name><phone>555-2</phone></lead>
          <lead><name></name><phone></phone></lead>
        </leads>"#
    .to_vec();
    let job_id = upload_to_preview(&api, "export", bytes).await;

    assert_eq!(api.job(&job_id).unwrap().format, Some(FileFormat::Xml));
    let preview = api.preview(&job_id).await.unwrap();
    assert_eq!(preview.total_rows, 3);
    assert_eq!(preview.valid_leads, 2);
    assert_eq!(preview.skipped_rows, 1);
}

/// 单工作表: 数值与日期单元格，第 3 行留空
fn leads_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Leads").unwrap();
    for (col, header) in ["Nombre", "Telefono", "Puntaje", "Seguimiento"]
        .iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    let date_format = Format::new().set_num_format("dd/mm/yyyy");
    let follow_up = ExcelDateTime::from_ymd(2024, 3, 15).unwrap();
    sheet.write_string(1, 0, "Ana").unwrap();
    sheet.write_string(1, 1, "555-0100").unwrap();
    sheet.write_number(1, 2, 85.0).unwrap();
    sheet
        .write_datetime_with_format(1, 3, &follow_up, &date_format)
        .unwrap();
    sheet.write_string(3, 0, "Luis").unwrap();
    sheet.write_number(3, 1, 5550101.0).unwrap();
    sheet.write_number(3, 2, 72.5).unwrap();
    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn test_xlsx_upload_reaches_preview() {
    let api = build_api(Arc::new(MemoryLeadStore::new()), test_settings(10, 2));

    let job_id = upload_to_preview(&api, "leads.xlsx", leads_workbook()).await;
    assert_eq!(api.job(&job_id).unwrap().format, Some(FileFormat::Xlsx));

    let mapping = api.mapping(&job_id).await.unwrap();
    assert_eq!(
        mapping.mapping.get(InternalField::QualificationScore),
        Some("Puntaje")
    );
    assert_eq!(mapping.mapping.get(InternalField::NextFollowUp), Some("Seguimiento"));

    let preview = api.preview(&job_id).await.unwrap();
    assert_eq!(preview.total_rows, 2);
    assert_eq!(preview.valid_leads, 2);

    let ana = &preview.sample[0];
    assert_eq!(ana.qualification_score, Some(85.0));
    assert_eq!(ana.next_follow_up, NaiveDate::from_ymd_opt(2024, 3, 15));
    assert_eq!(preview.sample[1].phone, "5550101");
    assert_eq!(preview.sample[1].qualification_score, Some(72.5));
}

#[tokio::test]
async fn test_csv_with_bom_and_ragged_rows_warns() {
    let api = build_api(Arc::new(MemoryLeadStore::new()), test_settings(10, 2));

    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(b"Nombre,Telefono\nAna,555-1,extra\nLuis,555-2\n");
    let job_id = upload_to_preview(&api, "leads.csv", bytes).await;

    let job = api.job(&job_id).unwrap();
    assert_eq!(job.format, Some(FileFormat::Csv));
    assert!(!job.warnings.is_empty());

    let mapping = api.mapping(&job_id).await.unwrap();
    assert_eq!(mapping.mapping.get(InternalField::Name), Some("Nombre"));

    let preview = api.preview(&job_id).await.unwrap();
    assert_eq!(preview.valid_leads, 2);
}

#[tokio::test]
async fn test_header_only_file_fails() {
    let api = build_api(Arc::new(MemoryLeadStore::new()), test_settings(10, 2));

    let job_id = api
        .upload(test_tenant(), "leads.csv", b"Nombre;Telefono\n".to_vec())
        .await
        .unwrap();
    let phase = wait_for_phase(&api, &job_id, ImportPhase::PreviewReady).await;
    assert_eq!(phase, ImportPhase::Failed);
}

#[tokio::test]
async fn test_oversized_file_fails() {
    let mut settings = test_settings(10, 2);
    settings.max_file_bytes = 16;
    let api = build_api(Arc::new(MemoryLeadStore::new()), settings);

    let job_id = api
        .upload(test_tenant(), "leads.csv", b"Nombre;Telefono\nAna;555-1\n".to_vec())
        .await
        .unwrap();
    let phase = wait_for_phase(&api, &job_id, ImportPhase::PreviewReady).await;
    assert_eq!(phase, ImportPhase::Failed);
    assert!(api.result(&job_id).unwrap().errors[0].contains("16"));
}

/// 带示例行的模板上传后可直接预览出 1 条有效线索
#[tokio::test]
async fn test_templates_parse_back() {
    let api = build_api(Arc::new(MemoryLeadStore::new()), test_settings(10, 2));

    for format in [FileFormat::Csv, FileFormat::Json, FileFormat::Xml] {
        let template = api.template(format, true).unwrap();
        assert_eq!(template.file_name, format!("plantilla_leads.{}", format));

        let job_id = upload_to_preview(&api, &template.file_name, template.content).await;
        assert_eq!(api.job(&job_id).unwrap().format, Some(format));

        let mapping = api.mapping(&job_id).await.unwrap();
        assert!(mapping.issues.is_empty(), "{}: {:?}", format, mapping.issues);

        let preview = api.preview(&job_id).await.unwrap();
        assert_eq!(preview.valid_leads, 1, "{}", format);
        assert_eq!(preview.sample[0].phone, "555-0100");
    }

    assert!(api.template(FileFormat::Xlsx, false).is_err());
}
