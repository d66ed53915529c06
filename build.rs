use std::process::Command;

fn main() {
    // 获取 git 版本信息
    let git_hash = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    // 将版本信息传递给编译器
    println!("cargo:rustc-env=GIT_HASH={}", git_hash);

    // 确保 ffmpeg 可用
    let ffmpeg_check = Command::new("ffmpeg").arg("-version").output();
    if ffmpeg_check.is_err() {
        println!("cargo:warning=ffmpeg not found in PATH, media fetching will fail at runtime");
    }

    // yt-dlp 是可选的, 缺失时退回直接下载
    let yt_dlp_check = Command::new("yt-dlp").arg("--version").output();
    if yt_dlp_check.is_err() {
        println!("cargo:warning=yt-dlp not found in PATH, video page URLs will be downloaded directly");
    }
}
