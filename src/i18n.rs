// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持中文（默认）、英文、西班牙文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 支持的语言
pub const SUPPORTED_LOCALES: [&str; 3] = ["zh-CN", "en", "es"];

/// 默认语言
pub const DEFAULT_LOCALE: &str = "zh-CN";

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言（不支持的语言回退为默认语言）
///
/// # 参数
/// - locale: 语言代码（"zh-CN" / "en" / "es"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(normalize_locale(locale));
}

/// 规范化语言代码（en-US → en，es_MX → es）
pub fn normalize_locale(locale: &str) -> &'static str {
    let lower = locale.trim().to_ascii_lowercase().replace('_', "-");
    SUPPORTED_LOCALES
        .iter()
        .copied()
        .find(|l| l.to_ascii_lowercase() == lower)
        .or_else(|| {
            let primary = lower.split('-').next().unwrap_or("");
            SUPPORTED_LOCALES
                .iter()
                .copied()
                .find(|l| l.split('-').next() == Some(primary))
        })
        .unwrap_or(DEFAULT_LOCALE)
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use crm_lead_import::i18n::t;
/// let msg = t("progress.canceled");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use crm_lead_import::i18n::t_with_args;
/// let msg = t_with_args("progress.uploading", &[("file", "leads.csv")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}
