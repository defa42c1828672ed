// ==========================================
// CRM 线索导入 - 命令行入口
// ==========================================
// 用法:
//   crm-lead-import <file> [db_path] [--commit] [--tenant <id>] [--org <id>]
//
// 默认只做预演（dry-run），输出预览 JSON；--commit 时分批落库并输出结果 JSON
// ==========================================

use anyhow::{bail, Context};
use crm_lead_import::app::{get_default_db_path, AppState};
use crm_lead_import::domain::types::ImportPhase;
use crm_lead_import::domain::TenantContext;
use crm_lead_import::logging;
use serde_json::json;
use std::path::Path;

struct CliArgs {
    file: String,
    db_path: String,
    commit: bool,
    tenant_id: String,
    organization_id: String,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut positional = Vec::new();
    let mut commit = false;
    let mut tenant_id = "default".to_string();
    let mut organization_id = "default".to_string();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--commit" => commit = true,
            "--tenant" => tenant_id = args.next().context("--tenant 缺少参数值")?,
            "--org" => organization_id = args.next().context("--org 缺少参数值")?,
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let file = positional
        .next()
        .context("用法: crm-lead-import <file> [db_path] [--commit] [--tenant <id>] [--org <id>]")?;
    let db_path = positional.next().unwrap_or_else(get_default_db_path);

    Ok(CliArgs {
        file,
        db_path,
        commit,
        tenant_id,
        organization_id,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = parse_args()?;

    tracing::info!("{} v{}", crm_lead_import::APP_NAME, crm_lead_import::VERSION);
    tracing::info!("使用数据库: {}", args.db_path);

    let bytes = std::fs::read(&args.file).with_context(|| format!("无法读取文件: {}", args.file))?;
    let file_name = Path::new(&args.file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.file.clone());

    let state = AppState::new(args.db_path.clone())
        .await
        .map_err(anyhow::Error::msg)?;
    let api = state.import_api.clone();

    let tenant = TenantContext::new(args.tenant_id, args.organization_id);
    let job_id = api.upload(tenant, &file_name, bytes).await?;

    // 等待解析结束（进入映射校验 / 预览，或失败）
    let mut subscription = api.subscribe(&job_id)?;
    let mut phase = ImportPhase::Uploading;
    while let Some(message) = subscription.recv().await {
        phase = message.current_phase;
        if matches!(
            phase,
            ImportPhase::MappingValidating | ImportPhase::PreviewReady
        ) || phase.is_terminal()
        {
            break;
        }
    }

    if phase.is_terminal() {
        let result = api.release(&job_id).await?;
        println!("{}", serde_json::to_string_pretty(&json!({ "jobId": job_id, "phase": phase, "result": result }))?);
        bail!("导入失败");
    }

    let mapping = api.mapping(&job_id).await?;
    if !mapping.issues.is_empty() {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "jobId": job_id,
                "columns": api.columns(&job_id).await?,
                "mapping": mapping,
            }))?
        );
        api.cancel(&job_id).await?;
        api.release(&job_id).await?;
        bail!("字段映射需人工修正");
    }

    let preview = api.preview(&job_id).await?;
    let job = api.job(&job_id)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "jobId": job_id,
            "format": job.format,
            "mapping": mapping.accepted,
            "preview": preview,
        }))?
    );

    if !args.commit {
        api.cancel(&job_id).await?;
        api.release(&job_id).await?;
        return Ok(());
    }

    api.commit(&job_id).await?;
    let result = api.wait_for_terminal(&job_id).await?;
    let summary = api.commit_summary(&job_id).await?;
    let final_phase = api.job(&job_id)?.phase;
    api.release(&job_id).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "jobId": job_id,
            "phase": final_phase,
            "result": result,
            "batches": summary,
        }))?
    );

    if final_phase != ImportPhase::Completed {
        bail!("导入未完成: {}", final_phase);
    }
    Ok(())
}
