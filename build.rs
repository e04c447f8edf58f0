use vergen::EmitBuilder;

fn main() {
    // 构建时间与提交号，启动时写入日志
    if let Err(e) = EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit()
    {
        println!("cargo:warning=无法生成构建信息: {}", e);
    }
}
