//! 存储键命名约定
//!
//! 暂存件和产物的键都是 image_id 的纯函数，重复处理同一任务
//! 总是覆盖同一目标文件，这是重投递安全的前提。

use std::path::Path;

/// 原始上传件目录
pub const ORIGIN_PREFIX: &str = "images/origin";
/// 规范输入件目录
pub const INPUT_PREFIX: &str = "images/in";
/// 灰度产物目录
pub const OUTPUT_PREFIX: &str = "images/out";

/// 原始上传件的存储键，按客户端文件名存放。
/// 只取路径的最后一段，客户端文件名不能逃出存储根。
pub fn origin_key(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin");
    format!("{}/{}", ORIGIN_PREFIX, name)
}

/// 规范输入件的存储键：image_id 拼上原始扩展名，无扩展名则不拼。
pub fn staged_key(image_id: &str, original_path: &str) -> String {
    match Path::new(original_path)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) => format!("{}/{}.{}", INPUT_PREFIX, image_id, ext),
        None => format!("{}/{}", INPUT_PREFIX, image_id),
    }
}

/// 灰度产物的存储键，输出固定为 PNG。
pub fn output_key(image_id: &str) -> String {
    format!("{}/{}_grayscale.png", OUTPUT_PREFIX, image_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_pure_functions_of_image_id() {
        let id = "7c2f6a0e";
        assert_eq!(
            staged_key(id, "images/origin/cat.png"),
            staged_key(id, "images/origin/cat.png")
        );
        assert_eq!(output_key(id), output_key(id));
        assert_eq!(output_key(id), "images/out/7c2f6a0e_grayscale.png");
    }

    #[test]
    fn staged_key_keeps_original_extension() {
        assert_eq!(
            staged_key("abc", "images/origin/photo.JPG"),
            "images/in/abc.JPG"
        );
        assert_eq!(staged_key("abc", "images/origin/scan"), "images/in/abc");
    }

    #[test]
    fn origin_key_strips_directories() {
        assert_eq!(origin_key("cat.png"), "images/origin/cat.png");
        // 恶意文件名不能穿越到存储根之外
        assert_eq!(origin_key("../../etc/passwd"), "images/origin/passwd");
        assert_eq!(origin_key("/abs/path/dog.jpg"), "images/origin/dog.jpg");
    }
}
