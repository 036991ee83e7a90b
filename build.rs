fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    // Sub-controller protocols. Client stubs drive placement, action and sync
    // controllers; server stubs back the ContextUpdate endpoint and test fakes.
    let mut config = prost_build::Config::new();
    config.disable_comments(["."]);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos_with_config(
            config,
            &[
                "proto/contextupdate.proto",
                "proto/placementcontroller.proto",
                "proto/installapp.proto",
                "proto/updateapp.proto",
                "proto/readynotify.proto",
            ],
            &["proto/"],
        )?;
    Ok(())
}
