fn main() {
    compile_protos();
}

fn compile_protos() {
    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(
            &[
                // Shared automation surface (package: diagram_sdk.automation)
                "../../proto/identifiers.proto",
                "../../proto/application.proto",
                // FlexLogger-specific surface (package: flexlogger.automation)
                "../../proto/flexlogger_application.proto",
                "../../proto/project.proto",
            ],
            &["../../proto/"],
        )
        .unwrap();

    println!("cargo:rerun-if-changed=../../proto");
}
