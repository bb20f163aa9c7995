//! 文件类型映射
//!
//! 按扩展名（小写）查找上传时使用的 MIME 类型

use phf::phf_map;

/// 无法识别的文件类型
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// 支持的证件图片/文档类型
static DOCUMENT_MIME_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "png" => "image/png",
    "jpg" => "image/jpeg",
    "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "bmp" => "image/bmp",
    "tif" => "image/tiff",
    "tiff" => "image/tiff",
    "heic" => "image/heic",
    "pdf" => "application/pdf",
};

fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// 根据文件名获取 MIME 类型，未知类型返回 `application/octet-stream`
pub fn mime_for(file_name: &str) -> &'static str {
    lookup(file_name).unwrap_or(FALLBACK_MIME)
}

/// 文件扩展名是否在支持列表中
pub fn is_supported(file_name: &str) -> bool {
    lookup(file_name).is_some()
}

fn lookup(file_name: &str) -> Option<&'static str> {
    let ext = extension_of(file_name)?;
    DOCUMENT_MIME_TYPES.get(ext.as_str()).copied()
}
