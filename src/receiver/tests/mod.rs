mod audio_pipeline;
